//! Error Recovery
//!
//! Builds the enriched question used to regenerate SQL after a failure.

use crate::execution_loop::error_classifier::SqlErrorClass;

const FIX_CHECKLIST: &str = "Please fix the SQL query to avoid this error. Review the schema carefully and ensure:
- All table names are correct and exist in the schema
- All column names are correct and exist in their respective tables
- Column references are properly qualified with table names in JOINs
- Data types are compatible in comparisons and operations
- Aggregation functions are used correctly
- JOIN conditions reference valid foreign key relationships";

/// Recovery prompt builder
pub struct ErrorRecovery;

impl ErrorRecovery {
    pub fn new() -> Self {
        Self
    }

    /// Original question followed by the failure and the SQL that caused it
    pub fn enriched_question(
        &self,
        question: &str,
        error_message: &str,
        failed_sql: &str,
        error_class: &SqlErrorClass,
    ) -> String {
        format!(
            "{}\n\nPREVIOUS ATTEMPT FAILED WITH ERROR:\n{}\n\nFAILED SQL QUERY:\n{}\n\n{}\n\nHINT ({}): {}\n",
            question,
            error_message,
            failed_sql,
            FIX_CHECKLIST,
            error_class,
            error_class.hint()
        )
    }
}

impl Default for ErrorRecovery {
    fn default() -> Self {
        Self::new()
    }
}
