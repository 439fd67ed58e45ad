pub mod helpers;
mod sync_scenarios;
