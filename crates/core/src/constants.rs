/// Currency every imported amount is normalized against. The `amount_usd`
/// fields of transactions and records hold amounts in this currency.
pub const BASE_CURRENCY: &str = "USD";

/// Decimal places kept for base-currency (USD) amounts
pub const USD_DECIMAL_PLACES: u32 = 2;

/// Decimal places kept for derived exchange rates
pub const RATE_DECIMAL_PLACES: u32 = 6;

/// Minor units per major unit for every supported currency
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;
