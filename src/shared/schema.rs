diesel::table! {
    kpi_master_events (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        company_id -> Uuid,
        event_code -> Varchar,
        event_name -> Varchar,
        fiscal_year -> Int4,
        status -> Varchar,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    kpi_definitions (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        company_id -> Uuid,
        kpi_code -> Varchar,
        kpi_name -> Varchar,
        description -> Nullable<Text>,
        unit -> Nullable<Varchar>,
        aggregation_method -> Varchar,
        direction -> Nullable<Varchar>,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    kpi_master_items (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        company_id -> Uuid,
        kpi_event_id -> Uuid,
        parent_kpi_item_id -> Nullable<Uuid>,
        kpi_code -> Varchar,
        kpi_name -> Varchar,
        kpi_type -> Varchar,
        hierarchy_level -> Int2,
        ref_subject_id -> Nullable<Uuid>,
        ref_kpi_definition_id -> Nullable<Uuid>,
        ref_metric_id -> Nullable<Uuid>,
        department_stable_id -> Nullable<Varchar>,
        owner_employee_id -> Nullable<Uuid>,
        unit -> Nullable<Varchar>,
        sort_order -> Int4,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    kpi_fact_amounts (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        company_id -> Uuid,
        kpi_event_id -> Uuid,
        kpi_definition_id -> Uuid,
        period_code -> Varchar,
        period_start_date -> Nullable<Date>,
        period_end_date -> Nullable<Date>,
        department_stable_id -> Nullable<Varchar>,
        target_value -> Nullable<Numeric>,
        actual_value -> Nullable<Numeric>,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    kpi_target_values (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        company_id -> Uuid,
        kpi_master_item_id -> Uuid,
        period_code -> Varchar,
        target_value -> Numeric,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ref_subjects (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        company_id -> Uuid,
        is_active -> Bool,
    }
}

diesel::table! {
    ref_metrics (id) {
        id -> Uuid,
        tenant_id -> Uuid,
        company_id -> Uuid,
        is_active -> Bool,
    }
}

diesel::joinable!(kpi_master_items -> kpi_master_events (kpi_event_id));
diesel::joinable!(kpi_fact_amounts -> kpi_master_events (kpi_event_id));
diesel::joinable!(kpi_fact_amounts -> kpi_definitions (kpi_definition_id));
diesel::joinable!(kpi_target_values -> kpi_master_items (kpi_master_item_id));

diesel::allow_tables_to_appear_in_same_query!(
    kpi_master_events,
    kpi_definitions,
    kpi_master_items,
    kpi_fact_amounts,
    kpi_target_values,
    ref_subjects,
    ref_metrics,
);
