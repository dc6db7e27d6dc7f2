pub mod card;
pub mod intent;
pub mod outcome;
