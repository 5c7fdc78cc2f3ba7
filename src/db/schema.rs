// Kept hand-written rather than generated by `diesel print-schema`, since
// this crate's migrations live alongside it rather than against a live
// database at build time.

diesel::table! {
    jobs (id) {
        id -> Uuid,
        codebase_id -> Text,
        job_type -> Text,
        state -> Text,
        base_commit -> Nullable<Text>,
        started_at -> Nullable<Timestamptz>,
        finished_at -> Nullable<Timestamptz>,
        error_code -> Nullable<Text>,
        error_message -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    task_results (id) {
        id -> Uuid,
        job_id -> Uuid,
        task_name -> Text,
        outcome -> Text,
        duration_ms -> BigInt,
        retries_used -> Integer,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(task_results -> jobs (job_id));
diesel::allow_tables_to_appear_in_same_query!(jobs, task_results);
