diesel::table! {
    concerts (id) {
        id -> Int4,
        name -> Varchar,
        description -> Text,
        venue_id -> Int4,
        concert_date -> Date,
        image -> Nullable<Varchar>,
    }
}

diesel::table! {
    reservations (id) {
        id -> Int4,
        concert_id -> Int4,
        owner_id -> Int4,
        ticket_number -> Int4,
        ticket_price -> Numeric,
        starting_date -> Timestamptz,
        final_date -> Date,
    }
}

diesel::joinable!(reservations -> concerts (concert_id));

diesel::allow_tables_to_appear_in_same_query!(
    concerts,
    reservations,
);
