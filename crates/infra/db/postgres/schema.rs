diesel::table! {
    payments (id) {
        id -> Uuid,
        user_id -> Uuid,
        subscription_id -> Uuid,
        amount_minor -> Int4,
        currency -> Text,
        status -> Text,
        external_payment_id -> Nullable<Text>,
        plan_type -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    profiles (user_id) {
        user_id -> Uuid,
        email -> Nullable<Text>,
        is_premium -> Bool,
        is_admin -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    subscriptions (id) {
        id -> Uuid,
        user_id -> Uuid,
        plan_type -> Text,
        status -> Text,
        channel -> Text,
        external_reference -> Nullable<Text>,
        current_period_start -> Nullable<Timestamptz>,
        current_period_end -> Nullable<Timestamptz>,
        cancel_at_period_end -> Bool,
        canceled_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(payments -> subscriptions (subscription_id));

diesel::allow_tables_to_appear_in_same_query!(payments, profiles, subscriptions,);
