/// Raw quantity worth `balance_pct` percent of the balance at `price`
pub fn size_from_balance(wallet_balance: f64, balance_pct: f64, price: f64) -> f64 {
    (wallet_balance * balance_pct / 100.0) / price
}

/// Round a quantity to the nearest multiple of the instrument's lot size
///
/// The 8-decimal cleanup removes float residue so the venue accepts the
/// value verbatim.
pub fn round_to_lot(quantity: f64, lot_size: f64) -> f64 {
    if lot_size <= 0.0 {
        return quantity;
    }
    let stepped = (quantity / lot_size).round() * lot_size;
    (stepped * 1e8).round() / 1e8
}

/// Round a price to the nearest multiple of the instrument's tick size
pub fn round_to_tick(price: f64, tick_size: f64) -> f64 {
    if tick_size <= 0.0 {
        return price;
    }
    let stepped = (price / tick_size).round() * tick_size;
    (stepped * 1e8).round() / 1e8
}
