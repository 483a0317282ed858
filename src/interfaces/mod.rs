pub mod demand_charge;
pub mod flex_energy;

pub use demand_charge::*;
pub use flex_energy::*;
