pub const HEALTH_ROUTE: &str = "/";
pub const GET_PLACES_ROUTE: &str = "/get-places";
pub const REVERSE_GEOCODE_ROUTE: &str = "/reverse-geocode";
pub const GET_CREDITS_ROUTE: &str = "/get-credits";
pub const GET_TRIAL_CREDITS_ROUTE: &str = "/get-trial-credits";
pub const VERIFY_PURCHASE_ROUTE: &str = "/verify-purchase";
