//! Wire topics this crate touches (spec §6). Duplicated rather than
//! imported from `pvm-phase` — the two crates share no dependency edge,
//! by design, so neither's compile depends on the other's domain model.

pub const MATCH_REQUEST: &str = "match.request";
pub const MATCH_RESULT: &str = "match.result";
pub const MATCHINGS_PROCESS_COMPLETED: &str = "matchings.process.completed";
