pub const BOOKINGS: &str = "bookings";

// Secondary index trees
pub const BOOKINGS_BY_DATE: &str = "bookings_by_date";
