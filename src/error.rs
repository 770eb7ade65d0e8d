use crate::objects::ObjectId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt object reference: {0}")]
    CorruptReference(ObjectId),

    #[error("object {0} is flushed and can no longer be modified")]
    ImmutableObject(ObjectId),

    #[error("object {0} is not fully resolved")]
    UnresolvedObject(ObjectId),

    #[error("document has no pages")]
    NoPages,

    #[error("document is already closed")]
    DocumentClosed,

    #[error("invalid page number: {0}")]
    InvalidPageNumber(u32),

    #[error("invalid page range: {from}..={to} of {count} pages")]
    InvalidPageRange { from: u32, to: u32, count: u32 },
}

pub type Result<T> = std::result::Result<T, PdfError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_error_display() {
        let error = PdfError::ImmutableObject(ObjectId::new(7, 0));
        assert_eq!(
            error.to_string(),
            "object 7 0 R is flushed and can no longer be modified"
        );

        let error = PdfError::InvalidPageRange {
            from: 2,
            to: 5,
            count: 3,
        };
        assert_eq!(error.to_string(), "invalid page range: 2..=5 of 3 pages");
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = IoError::new(ErrorKind::NotFound, "file not found");
        let error = PdfError::from(io_error);

        match error {
            PdfError::Io(ref err) => assert_eq!(err.kind(), ErrorKind::NotFound),
            _ => panic!("expected IO error variant"),
        }
    }

    #[test]
    fn test_all_variants_display() {
        let errors = vec![
            PdfError::CorruptReference(ObjectId::new(1, 0)),
            PdfError::ImmutableObject(ObjectId::new(2, 0)),
            PdfError::UnresolvedObject(ObjectId::new(3, 1)),
            PdfError::NoPages,
            PdfError::DocumentClosed,
            PdfError::InvalidPageNumber(99),
            PdfError::InvalidPageRange {
                from: 1,
                to: 2,
                count: 0,
            },
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PdfError>();
    }
}
