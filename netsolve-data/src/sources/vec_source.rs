use super::RecordSource;
use crate::datum::Datum;
use netsolve_core::NetsolveError;

/// A simple source that wraps a `Vec` of serialized records.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    records: Vec<Vec<u8>>,
    cursor: usize,
}

impl VecSource {
    pub fn new(records: Vec<Vec<u8>>) -> Self {
        Self { records, cursor: 0 }
    }

    /// Serializes each datum up front.
    pub fn from_datums<'a>(datums: impl IntoIterator<Item = &'a Datum>) -> Self {
        Self::new(datums.into_iter().map(Datum::encode_record).collect())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSource for VecSource {
    fn next_record(&mut self) -> Result<Option<Vec<u8>>, NetsolveError> {
        let record = self.records.get(self.cursor).cloned();
        if record.is_some() {
            self.cursor += 1;
        }
        Ok(record)
    }

    fn rewind(&mut self) -> Result<(), NetsolveError> {
        self.cursor = 0;
        Ok(())
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.records.len())
    }
}
