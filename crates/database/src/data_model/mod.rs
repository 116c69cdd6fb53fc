pub mod candidates;
pub mod rides;
pub mod ride_requests;
pub mod sessions;
pub mod users;

/// Enum columns are stored as plain `TEXT`; conversion happens at the row
/// boundary rather than leaning on a custom `sqlx::Type` per enum, since the
/// full set is small and the failure mode (an unrecognized string) should
/// surface as a store error rather than a panic.
pub(crate) fn unknown_variant(column: &str, value: &str) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("unrecognized value {value:?} for column {column}"),
    )
}
