mod extractor;

pub use extractor::{NativeExtractor, STALE_TEMP_AGE};
