//! Telegram datacenter addresses

/// Telegram datacenter addresses (production)
const DC_ADDRESSES: [(i32, &str); 5] = [
    (1, "149.154.175.53"),
    (2, "149.154.167.51"),
    (3, "149.154.175.100"),
    (4, "149.154.167.91"),
    (5, "91.108.56.130"),
];

/// Telegram datacenter addresses (test servers)
const TEST_DC_ADDRESSES: [(i32, &str); 3] = [
    (1, "149.154.175.10"),
    (2, "149.154.167.40"),
    (3, "149.154.175.117"),
];

/// Port every session format records for a DC
pub const DC_PORT: u16 = 443;

/// DC used when the id is not in the table
pub const FALLBACK_DC: i32 = 2;

/// Address of a datacenter
///
/// Unknown ids resolve to DC 2, matching what clients do for a missing entry.
pub fn address(dc_id: i32, test_mode: bool) -> &'static str {
    let table: &[(i32, &str)] = if test_mode {
        &TEST_DC_ADDRESSES
    } else {
        &DC_ADDRESSES
    };

    table
        .iter()
        .find(|(id, _)| *id == dc_id)
        .or_else(|| table.iter().find(|(id, _)| *id == FALLBACK_DC))
        .map(|(_, ip)| *ip)
        .unwrap_or(DC_ADDRESSES[1].1)
}

/// True for DC ids the production table knows about
pub fn is_known(dc_id: i32) -> bool {
    DC_ADDRESSES.iter().any(|(id, _)| *id == dc_id)
}
