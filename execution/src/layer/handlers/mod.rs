use super::*;

mod bets;
mod stakes;
