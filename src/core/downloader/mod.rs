mod client;

pub use client::{BatchReport, DownloadEntry, Downloader, FileOutcome, RetryPolicy};
