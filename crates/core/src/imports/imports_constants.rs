/// Jobs an owner may have in QUEUED or PROCESSING at once
pub const MAX_PENDING_JOBS_PER_OWNER: usize = 5;

/// Default global ceiling of PROCESSING jobs
pub const DEFAULT_MAX_CONCURRENT_IMPORTS: usize = 3;

/// Default upload limit: 10 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Default hard timeout for the statement-processing service
pub const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 5 * 60;

/// Failure text stored on a job is cut to this many characters
pub const MAX_ERROR_MESSAGE_CHARS: usize = 1000;

/// Warnings quoted in the "no valid rows" failure message
pub const MAX_FAILURE_CONTEXT_WARNINGS: usize = 3;

/// Message stored on jobs failed by the lease reaper
pub const ABANDONED_JOB_MESSAGE: &str = "Import was abandoned while processing";

// Workbook media types
pub const MEDIA_TYPE_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MEDIA_TYPE_XLSM: &str = "application/vnd.ms-excel.sheet.macroenabled.12";
pub const MEDIA_TYPE_XLS: &str = "application/vnd.ms-excel";
pub const MEDIA_TYPE_ODS: &str = "application/vnd.oasis.opendocument.spreadsheet";

pub const WORKBOOK_MEDIA_TYPES: [&str; 4] =
    [MEDIA_TYPE_XLSX, MEDIA_TYPE_XLSM, MEDIA_TYPE_XLS, MEDIA_TYPE_ODS];

pub const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];
