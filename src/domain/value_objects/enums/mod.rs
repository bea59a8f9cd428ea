pub mod processing_statuses;
