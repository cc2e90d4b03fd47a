//! Esquema Diesel (escrito a mano, equivalente a `diesel print-schema`).

diesel::table! {
    flows (id) {
        id -> BigInt,
        ref_id -> Uuid,
        name -> Text,
        category -> Nullable<Text>,
        reference_unit -> Text,
        reference_quantity -> Text,
    }
}

diesel::table! {
    units (name) {
        name -> Text,
        quantity -> Text,
        factor -> Double,
    }
}

diesel::table! {
    flow_property_factors (flow_id, quantity) {
        flow_id -> BigInt,
        quantity -> Text,
        factor -> Double,
    }
}

diesel::table! {
    exchanges (id) {
        id -> BigInt,
        process_id -> BigInt,
        flow_id -> BigInt,
        amount -> Double,
        unit -> Text,
    }
}

diesel::table! {
    impact_factors (id) {
        id -> BigInt,
        impact_category_id -> BigInt,
        flow_id -> BigInt,
        value -> Double,
        unit -> Text,
    }
}

diesel::joinable!(flow_property_factors -> flows (flow_id));
diesel::joinable!(exchanges -> flows (flow_id));
diesel::joinable!(impact_factors -> flows (flow_id));

diesel::allow_tables_to_appear_in_same_query!(
    flows,
    units,
    flow_property_factors,
    exchanges,
    impact_factors,
);
