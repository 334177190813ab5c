//! The mongodb crate doesn't provide error code constants, so we define the
//! one we care about ourselves.

use mongodb::error::{Error as DbError, ErrorKind, WriteFailure};

pub const DUPLICATE_KEY: i32 = 11000;

/// Return true if the given error is a unique-index violation.
///
/// This is how concurrent conflicting writes (duplicate email, duplicate
/// title, double vote) surface: the application-level existence checks are
/// only a fast path for a friendly message, the unique index is the actual
/// guarantee, and its violation must be translated to a 409 rather than
/// propagated as a 500.
pub fn is_duplicate_key_error(err: &DbError) -> bool {
    if let ErrorKind::Write(WriteFailure::WriteError(ref e)) = *err.kind {
        return e.code == DUPLICATE_KEY;
    }
    false
}

#[cfg(test)]
mod tests {
    use mongodb::bson::{doc, from_document};
    use mongodb::error::{WriteConcernError, WriteError};

    use super::*;

    // The driver's error structs are non-exhaustive; deserialize them the
    // way the driver itself builds them from a server reply.
    fn write_error(code: i32) -> DbError {
        let inner: WriteError = from_document(doc! {
            "code": code,
            "errmsg": "write failed",
        })
        .unwrap();
        ErrorKind::Write(WriteFailure::WriteError(inner)).into()
    }

    #[test]
    fn accepts_unique_index_violations() {
        assert!(is_duplicate_key_error(&write_error(DUPLICATE_KEY)));
    }

    #[test]
    fn rejects_other_write_errors() {
        // 121 = document validation failure.
        assert!(!is_duplicate_key_error(&write_error(121)));
    }

    #[test]
    fn rejects_write_concern_errors() {
        // Same code, different failure class: must not look like a conflict.
        let inner: WriteConcernError = from_document(doc! {
            "code": DUPLICATE_KEY,
            "codeName": "DuplicateKey",
            "errmsg": "waiting for replication",
        })
        .unwrap();
        let err: DbError = ErrorKind::Write(WriteFailure::WriteConcernError(inner)).into();
        assert!(!is_duplicate_key_error(&err));
    }
}
