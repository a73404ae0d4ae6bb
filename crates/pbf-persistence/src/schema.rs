//! Esquema Diesel (escrito a mano). Reemplazable con `diesel print-schema`.

diesel::table! {
    run_events (run_id, seq) {
        run_id -> Uuid,
        seq -> BigInt,
        ts -> Timestamptz,
        event_type -> Text,
        payload -> Jsonb,
    }
}

diesel::table! {
    schedules (schedule_id) {
        schedule_id -> Text,
        interval_secs -> BigInt,
        next_fire -> Timestamptz,
    }
}

diesel::table! {
    run_leases (run_id) {
        run_id -> Uuid,
        owner -> Text,
        expires_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(run_events, run_leases, schedules,);
