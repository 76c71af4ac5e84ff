//! Unified error codes for the business registry service
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 3xxx: Business registry errors (records, bulk sync, snapshots)
//! - 4xxx: Invoice ledger errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility (Rust, TypeScript, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,
    /// Required field missing
    RequiredField = 7,
    /// Value out of range
    ValueOutOfRange = 8,

    // ==================== 1xxx: Auth ====================
    /// User is not authenticated
    NotAuthenticated = 1001,
    /// Token has expired
    TokenExpired = 1003,
    /// Token is invalid
    TokenInvalid = 1004,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,

    // ==================== 3xxx: Business registry ====================
    /// Business record not found
    BusinessNotFound = 3001,
    /// Another non-deleted business already uses this name
    BusinessNameExists = 3002,
    /// Business name is empty after normalization
    BusinessNameRequired = 3003,
    /// Destructive operation would orphan registered photos
    PhotoGuardViolation = 3004,
    /// A replace-all or batch upload is already running
    MigrationInProgress = 3005,
    /// No valid records left after normalization
    NoValidRecords = 3006,
    /// Unknown bulk upload mode
    InvalidUploadMode = 3007,
    /// Backup snapshot not found
    SnapshotNotFound = 3101,
    /// Backup snapshot could not be written
    SnapshotFailed = 3102,
    /// Replace-all failed after the snapshot was taken
    ReplaceAllFailed = 3103,

    // ==================== 4xxx: Invoice ledger ====================
    /// Invoice record not found
    InvoiceNotFound = 4001,
    /// Canonical stage already has an active original record
    InvoiceStageExists = 4002,
    /// Revision requires a reason
    RevisedReasonRequired = 4003,
    /// Revision parent is missing, cancelled, or belongs elsewhere
    InvoiceParentInvalid = 4004,
    /// Invoice record is already cancelled
    InvoiceAlreadyCancelled = 4005,
    /// Invoice record changed since it was read
    InvoiceStaleWrite = 4006,
    /// Only extra-stage records may be deleted
    InvoiceDeleteNotAllowed = 4007,
    /// Unknown invoice stage
    InvalidInvoiceStage = 4008,
    /// Extra-stage record requires a title
    ExtraTitleRequired = 4009,
    /// Invalid record type for this operation
    InvalidRecordType = 4010,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Operation timeout
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::RequiredField => "Required field is missing",
            ErrorCode::ValueOutOfRange => "Value is out of range",

            // Auth
            ErrorCode::NotAuthenticated => "User is not authenticated",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::TokenInvalid => "Authentication token is invalid",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",

            // Business registry
            ErrorCode::BusinessNotFound => "Business not found",
            ErrorCode::BusinessNameExists => "Business name already exists",
            ErrorCode::BusinessNameRequired => "Business name is required",
            ErrorCode::PhotoGuardViolation => "Businesses have registered photos",
            ErrorCode::MigrationInProgress => "A registry migration is already in progress",
            ErrorCode::NoValidRecords => "No valid business records to upload",
            ErrorCode::InvalidUploadMode => "Unknown upload mode",
            ErrorCode::SnapshotNotFound => "Backup snapshot not found",
            ErrorCode::SnapshotFailed => "Failed to create backup snapshot",
            ErrorCode::ReplaceAllFailed => "Replace-all failed; restore from the backup snapshot",

            // Invoice ledger
            ErrorCode::InvoiceNotFound => "Invoice record not found",
            ErrorCode::InvoiceStageExists => "Invoice stage already has an original record",
            ErrorCode::RevisedReasonRequired => "Revised record requires a reason",
            ErrorCode::InvoiceParentInvalid => "Revision parent record is invalid",
            ErrorCode::InvoiceAlreadyCancelled => "Invoice record is already cancelled",
            ErrorCode::InvoiceStaleWrite => "Invoice record was modified by another user",
            ErrorCode::InvoiceDeleteNotAllowed => "Only extra invoice records can be deleted",
            ErrorCode::InvalidInvoiceStage => "Unknown invoice stage",
            ErrorCode::ExtraTitleRequired => "Extra invoice record requires a title",
            ErrorCode::InvalidRecordType => "Invalid invoice record type",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::ConfigError => "Configuration error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            6 => Ok(ErrorCode::InvalidFormat),
            7 => Ok(ErrorCode::RequiredField),
            8 => Ok(ErrorCode::ValueOutOfRange),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1003 => Ok(ErrorCode::TokenExpired),
            1004 => Ok(ErrorCode::TokenInvalid),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),

            // Business registry
            3001 => Ok(ErrorCode::BusinessNotFound),
            3002 => Ok(ErrorCode::BusinessNameExists),
            3003 => Ok(ErrorCode::BusinessNameRequired),
            3004 => Ok(ErrorCode::PhotoGuardViolation),
            3005 => Ok(ErrorCode::MigrationInProgress),
            3006 => Ok(ErrorCode::NoValidRecords),
            3007 => Ok(ErrorCode::InvalidUploadMode),
            3101 => Ok(ErrorCode::SnapshotNotFound),
            3102 => Ok(ErrorCode::SnapshotFailed),
            3103 => Ok(ErrorCode::ReplaceAllFailed),

            // Invoice ledger
            4001 => Ok(ErrorCode::InvoiceNotFound),
            4002 => Ok(ErrorCode::InvoiceStageExists),
            4003 => Ok(ErrorCode::RevisedReasonRequired),
            4004 => Ok(ErrorCode::InvoiceParentInvalid),
            4005 => Ok(ErrorCode::InvoiceAlreadyCancelled),
            4006 => Ok(ErrorCode::InvoiceStaleWrite),
            4007 => Ok(ErrorCode::InvoiceDeleteNotAllowed),
            4008 => Ok(ErrorCode::InvalidInvoiceStage),
            4009 => Ok(ErrorCode::ExtraTitleRequired),
            4010 => Ok(ErrorCode::InvalidRecordType),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9004 => Ok(ErrorCode::TimeoutError),
            9005 => Ok(ErrorCode::ConfigError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
