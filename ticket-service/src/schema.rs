diesel::table! {
    tickets (id) {
        id -> Uuid,
        holder -> Varchar,
        holder_email -> Varchar,
        buyer_id -> Int4,
        reservation_id -> Int4,
        concert_id -> Int4,
        price -> Numeric,
        purchase_date -> Timestamptz,
        phone -> Varchar,
    }
}
