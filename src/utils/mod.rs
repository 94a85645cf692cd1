//! The `utils` module provides definitions shared by every platform.
//!
//! It holds the crate's error types, the logging bootstrap and slug checks.

pub mod error;
pub mod logging;
pub mod slug;

#[cfg(test)]
mod tests {
    use super::{logging, slug};

    #[test]
    fn logging_init_accepts_levels() {
        // Should not panic
        logging::init("info");
        logging::init("debug");
        logging::init("warn");
    }

    #[test]
    fn parse_level_falls_back_to_info() {
        assert_eq!(logging::parse_level("WARNING"), tracing::Level::WARN);
        assert_eq!(logging::parse_level("trace"), tracing::Level::TRACE);
        assert_eq!(logging::parse_level("verbose"), tracing::Level::INFO);
    }

    #[test]
    fn slug_accepts_only_lowercase_ids() {
        assert!(slug::is_slug("test_1"));
        assert!(slug::is_slug("hallway_group"));
        assert!(!slug::is_slug("name with space"));
        assert!(!slug::is_slug("Upper"));
        assert!(!slug::is_slug(""));
    }
}
