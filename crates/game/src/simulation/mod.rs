mod movement;
mod tick;

pub use movement::{PLAYER_SPEED, apply_input};
pub use tick::{FixedTimestep, TICK_DT, TickClock, TickOverflow};
