//! Log output for applications embedding the store.

use tracing::Level;

/// Install a formatting subscriber that prints events at `level` and above
/// to stderr. Returns `false` if a global subscriber was already set, in
/// which case nothing changes.
pub fn init_logging(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        init_logging(Level::DEBUG);
        assert!(!init_logging(Level::INFO));
    }
}
