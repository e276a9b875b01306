use crate::entities::Resource;

/// Random colors tried before accepting a duplicate.
pub const MAX_COLOR_ATTEMPTS: usize = 20;

/// Balances granted to a newly created account.
pub fn starting_balances() -> Vec<Resource> {
    vec![
        Resource::balance("Gold", 100),
        Resource::balance("Wood", 50),
        Resource::balance("Stone", 50),
    ]
}
