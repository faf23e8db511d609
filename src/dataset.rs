//! Count data keyed by gate string.
//!
//! A `DataSet` starts out mutable, accumulating one count vector per gate
//! string, and is promoted once with [`DataSet::done_adding_data`] into a
//! static form backed by a single shared matrix.

use crate::compress::{compress, expand, CompressedGateString};
use crate::error::{Error, Result};
use crate::gatestring::GateString;
use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use indexmap::{IndexMap, IndexSet};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

const FORMAT_VERSION: u32 = 1;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Largest plus-fraction change `add_counts_1q` accepts for an existing string.
const MAX_1Q_FRACTION_DISCREPANCY: f64 = 0.1;

#[derive(Clone, Debug)]
enum Counts {
    Rows(Vec<Array1<f64>>),
    Static(Arc<Array2<f64>>),
}

/// Per-gate-string outcome counts.
///
/// Cloning a static dataset shares its count matrix; cloning a mutable one
/// copies every row.
#[derive(Clone, Debug)]
pub struct DataSet {
    gs_index: IndexMap<GateString, usize>,
    sl_index: IndexMap<String, usize>,
    counts: Counts,
}

/// Read-only view of one row of a [`DataSet`].
#[derive(Clone, Copy, Debug)]
pub struct DataSetRow<'a> {
    sl_index: &'a IndexMap<String, usize>,
    values: ArrayView1<'a, f64>,
}

impl<'a> DataSetRow<'a> {
    pub fn get(&self, spam_label: &str) -> Option<f64> {
        self.sl_index.get(spam_label).map(|&i| self.values[i])
    }

    pub fn total(&self) -> f64 {
        self.values.sum()
    }

    /// Count for `spam_label` divided by the row total.
    pub fn fraction(&self, spam_label: &str) -> Option<f64> {
        self.get(spam_label).map(|c| c / self.total())
    }

    /// Raw counts in column order.
    pub fn values(&self) -> ArrayView1<'a, f64> {
        self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        let values = self.values;
        self.sl_index
            .iter()
            .map(move |(label, &i)| (label.as_str(), values[i]))
    }

    pub fn to_map(&self) -> IndexMap<String, f64> {
        self.iter().map(|(l, c)| (l.to_string(), c)).collect()
    }
}

impl fmt::Display for DataSetRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (label, count)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", label, count)?;
        }
        write!(f, "}}")
    }
}

impl DataSet {
    /// An empty mutable dataset. Repeated labels collapse to one column.
    pub fn new<It, S>(spam_labels: It) -> Self
    where
        It: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels = spam_labels
            .into_iter()
            .map(|s| s.into())
            .collect::<IndexSet<String>>();
        Self {
            gs_index: IndexMap::new(),
            sl_index: labels.into_iter().enumerate().map(|(i, l)| (l, i)).collect(),
            counts: Counts::Rows(vec![]),
        }
    }

    /// A static dataset whose row `i` holds the counts of `gate_strings[i]`.
    pub fn new_static(
        counts: Array2<f64>,
        gate_strings: Vec<GateString>,
        spam_labels: Vec<String>,
    ) -> Result<Self> {
        let (n_rows, n_cols) = counts.dim();
        if n_rows != gate_strings.len() || n_cols != spam_labels.len() {
            return Err(Error::Malformed(format!(
                "counts have shape ({}, {}) for {} gate strings and {} spam labels",
                n_rows,
                n_cols,
                gate_strings.len(),
                spam_labels.len()
            )));
        }
        let gs_index = gate_strings
            .into_iter()
            .enumerate()
            .map(|(i, gs)| (gs, i))
            .collect::<IndexMap<_, _>>();
        if gs_index.len() != n_rows {
            return Err(Error::Malformed("duplicate gate strings".into()));
        }
        let sl_index = spam_labels
            .into_iter()
            .enumerate()
            .map(|(i, l)| (l, i))
            .collect::<IndexMap<_, _>>();
        if sl_index.len() != n_cols {
            return Err(Error::Malformed("duplicate spam labels".into()));
        }
        Ok(Self {
            gs_index,
            sl_index,
            counts: Counts::Static(Arc::new(counts)),
        })
    }

    pub fn is_static(&self) -> bool {
        matches!(self.counts, Counts::Static(_))
    }

    pub fn len(&self) -> usize {
        self.gs_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gs_index.is_empty()
    }

    pub fn contains(&self, gate_string: &GateString) -> bool {
        self.gs_index.contains_key(gate_string)
    }

    pub fn keys(&self) -> impl Iterator<Item = &GateString> + '_ {
        self.gs_index.keys()
    }

    pub fn spam_labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.sl_index.keys().map(|s| s.as_str())
    }

    /// Distinct gate labels across every gate string, in first-seen order.
    pub fn gate_labels(&self) -> Vec<String> {
        self.gs_index
            .keys()
            .flat_map(|gs| gs.iter())
            .cloned()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    fn row_at(&self, index: usize) -> DataSetRow<'_> {
        let values = match &self.counts {
            Counts::Rows(rows) => rows[index].view(),
            Counts::Static(m) => m.row(index),
        };
        DataSetRow {
            sl_index: &self.sl_index,
            values,
        }
    }

    pub fn get(&self, gate_string: &GateString) -> Option<DataSetRow<'_>> {
        self.gs_index.get(gate_string).map(|&i| self.row_at(i))
    }

    pub fn row(&self, gate_string: &GateString) -> Result<DataSetRow<'_>> {
        self.get(gate_string)
            .ok_or_else(|| Error::MissingGateString(gate_string.clone()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GateString, DataSetRow<'_>)> + '_ {
        self.gs_index.iter().map(|(gs, &i)| (gs, self.row_at(i)))
    }

    /// Adds `counts` (in spam-label column order) to the row for `gate_string`.
    ///
    /// Counts totalling zero after rounding are dropped.
    pub fn add_count_list(&mut self, gate_string: GateString, counts: &[f64]) -> Result<()> {
        let rows = match &mut self.counts {
            Counts::Rows(rows) => rows,
            Counts::Static(_) => return Err(Error::StaticDataSet),
        };
        if counts.iter().sum::<f64>().round() == 0.0 {
            debug!(gate_string = %gate_string, "skipping counts with zero total");
            return Ok(());
        }
        if counts.len() != self.sl_index.len() {
            return Err(Error::CountLengthMismatch {
                gate_string,
                expected: self.sl_index.len(),
                found: counts.len(),
            });
        }
        let counts = ArrayView1::from(counts);
        match self.gs_index.get(&gate_string) {
            Some(&i) => rows[i] += &counts,
            None => {
                self.gs_index.insert(gate_string, rows.len());
                rows.push(counts.to_owned());
            }
        }
        Ok(())
    }

    /// Adds counts given per spam label. Every label of the dataset must be present.
    pub fn add_count_dict<It, S>(&mut self, gate_string: GateString, counts: It) -> Result<()>
    where
        It: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        if self.is_static() {
            return Err(Error::StaticDataSet);
        }
        let mut list = vec![None; self.sl_index.len()];
        for (label, count) in counts {
            let label = label.as_ref();
            match self.sl_index.get(label) {
                Some(&i) => list[i] = Some(count),
                None => {
                    return Err(Error::UnknownSpamLabel {
                        label: label.to_string(),
                        gate_string,
                    })
                }
            }
        }
        let mut values = Vec::with_capacity(list.len());
        for (label, &i) in &self.sl_index {
            match list[i] {
                Some(c) => values.push(c),
                None => {
                    return Err(Error::MissingSpamLabel {
                        label: label.clone(),
                        gate_string,
                    })
                }
            }
        }
        self.add_count_list(gate_string, &values)
    }

    /// Adds counts to a dataset with `plus` and `minus` spam labels.
    ///
    /// For a gate string already present, data whose plus fraction differs from
    /// the stored fraction by more than 0.1 is ignored.
    pub fn add_counts_1q(&mut self, gate_string: GateString, n_plus: f64, n_minus: f64) -> Result<()> {
        if self.is_static() {
            return Err(Error::StaticDataSet);
        }
        if let Some(current) = self.get(&gate_string).and_then(|r| r.fraction("plus")) {
            let incoming = n_plus / (n_plus + n_minus);
            if (current - incoming).abs() > MAX_1Q_FRACTION_DISCREPANCY {
                warn!(
                    gate_string = %gate_string,
                    current,
                    incoming,
                    "ignoring counts inconsistent with existing data"
                );
                return Ok(());
            }
        }
        self.add_count_dict(gate_string, [("plus", n_plus), ("minus", n_minus)])
    }

    /// Adds every row of `other`. Both datasets must have the same spam labels,
    /// possibly in a different column order.
    pub fn add_counts_from(&mut self, other: &DataSet) -> Result<()> {
        if self.is_static() {
            return Err(Error::StaticDataSet);
        }
        let same_labels = self.sl_index.len() == other.sl_index.len()
            && self.sl_index.keys().all(|l| other.sl_index.contains_key(l));
        if !same_labels {
            return Err(Error::SpamLabelMismatch {
                ours: self.sl_index.keys().cloned().collect(),
                theirs: other.sl_index.keys().cloned().collect(),
            });
        }
        for (gs, row) in other.iter() {
            let mut values = vec![0.0; self.sl_index.len()];
            for (label, &i) in &self.sl_index {
                values[i] = row.get(label).unwrap_or(0.0);
            }
            self.add_count_list(gs.clone(), &values)?;
        }
        Ok(())
    }

    /// A dataset holding only the rows of `keep` that are present here.
    ///
    /// A static source shares its count matrix with the result. With
    /// `error_if_missing`, any absent gate string fails the whole call.
    pub fn truncate(&self, keep: &[GateString], error_if_missing: bool) -> Result<DataSet> {
        if error_if_missing {
            if let Some(gs) = keep.iter().find(|gs| !self.contains(gs)) {
                return Err(Error::MissingGateString(gs.clone()));
            }
        }
        match &self.counts {
            Counts::Static(m) => {
                let gs_index = keep
                    .iter()
                    .filter_map(|gs| self.gs_index.get(gs).map(|&i| (gs.clone(), i)))
                    .collect();
                Ok(DataSet {
                    gs_index,
                    sl_index: self.sl_index.clone(),
                    counts: Counts::Static(Arc::clone(m)),
                })
            }
            Counts::Rows(_) => {
                let mut out = DataSet {
                    gs_index: IndexMap::new(),
                    sl_index: self.sl_index.clone(),
                    counts: Counts::Rows(vec![]),
                };
                for gs in keep {
                    if out.contains(gs) {
                        continue;
                    }
                    if let Some(row) = self.get(gs) {
                        out.add_count_list(gs.clone(), &row.values().to_vec())?;
                    }
                }
                Ok(out)
            }
        }
    }

    /// Promotes the dataset to static form. Calling it again has no effect.
    pub fn done_adding_data(&mut self) {
        if let Counts::Rows(rows) = &self.counts {
            let mut m = Array2::<f64>::zeros((rows.len(), self.sl_index.len()));
            for (mut dst, src) in m.rows_mut().into_iter().zip(rows) {
                dst.assign(src);
            }
            debug!(n_rows = rows.len(), "promoting DataSet to static");
            self.counts = Counts::Static(Arc::new(m));
        }
    }

    /// Same as `clone`: static datasets share their counts, mutable ones are deep copied.
    pub fn copy(&self) -> DataSet {
        self.clone()
    }

    /// Writes the dataset as a bincode header followed by its count arrays.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let header = Header {
            version: FORMAT_VERSION,
            gate_strings: self
                .gs_index
                .iter()
                .map(|(gs, &i)| (compress(gs), i))
                .collect(),
            spam_labels: self
                .sl_index
                .iter()
                .map(|(l, &i)| (l.clone(), i))
                .collect(),
            is_static: self.is_static(),
            n_arrays: match &self.counts {
                Counts::Rows(rows) => rows.len(),
                Counts::Static(_) => 1,
            },
        };
        bincode::serialize_into(&mut writer, &header)?;
        match &self.counts {
            Counts::Static(m) => bincode::serialize_into(&mut writer, &**m)?,
            Counts::Rows(rows) => {
                for row in rows {
                    bincode::serialize_into(&mut writer, row)?;
                }
            }
        }
        Ok(())
    }

    /// Inverse of [`DataSet::write_to`].
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let header: Header = bincode::deserialize_from(&mut reader)?;
        if header.version != FORMAT_VERSION {
            return Err(Error::Malformed(format!(
                "unsupported format version {}",
                header.version
            )));
        }
        let n_labels = header.spam_labels.len();
        let sl_index = header.spam_labels.into_iter().collect::<IndexMap<_, _>>();
        if sl_index.len() != n_labels || sl_index.values().any(|&i| i >= n_labels) {
            return Err(Error::Malformed("invalid spam label index".into()));
        }

        let (counts, n_rows, widths_ok) = if header.is_static {
            let m: Array2<f64> = bincode::deserialize_from(&mut reader)?;
            let (n_rows, n_cols) = m.dim();
            (Counts::Static(Arc::new(m)), n_rows, n_cols == n_labels)
        } else {
            let rows = (0..header.n_arrays)
                .map(|_| bincode::deserialize_from(&mut reader))
                .collect::<std::result::Result<Vec<Array1<f64>>, _>>()?;
            let widths_ok = rows.iter().all(|r| r.len() == n_labels);
            (Counts::Rows(rows), header.n_arrays, widths_ok)
        };
        if !widths_ok {
            return Err(Error::Malformed(
                "count arrays do not match the spam labels".into(),
            ));
        }

        let n_gs = header.gate_strings.len();
        let gs_index = header
            .gate_strings
            .into_iter()
            .map(|(c, i)| (expand(&c), i))
            .collect::<IndexMap<_, _>>();
        if gs_index.len() != n_gs || gs_index.values().any(|&i| i >= n_rows) {
            return Err(Error::Malformed("invalid gate string index".into()));
        }

        Ok(Self {
            gs_index,
            sl_index,
            counts,
        })
    }

    /// Saves to `path`, gzip-compressed when the name ends in `.gz`.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let writer = BufWriter::new(File::create(path)?);
        if path.to_string_lossy().ends_with(".gz") {
            let mut encoder = GzEncoder::new(writer, Compression::default());
            self.write_to(&mut encoder)?;
            encoder.finish()?.flush()?;
        } else {
            let mut writer = writer;
            self.write_to(&mut writer)?;
            writer.flush()?;
        }
        Ok(())
    }

    /// Loads a file written by [`DataSet::save_to`], compressed or not.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        if reader.fill_buf()?.starts_with(&GZIP_MAGIC) {
            Self::read_from(GzDecoder::new(reader))
        } else {
            Self::read_from(reader)
        }
    }
}

impl fmt::Display for DataSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (gs, row) in self.iter() {
            writeln!(f, "{}  :  {}", gs, row)?;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct Header {
    version: u32,
    gate_strings: Vec<(CompressedGateString, usize)>,
    spam_labels: Vec<(String, usize)>,
    is_static: bool,
    n_arrays: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;
    use std::io::Cursor;

    fn gs(labels: &[&str]) -> GateString {
        GateString::from(labels)
    }

    fn plus_minus() -> DataSet {
        DataSet::new(["plus", "minus"])
    }

    fn filled() -> Result<DataSet> {
        let mut ds = plus_minus();
        ds.add_count_list(gs(&[]), &[50.0, 50.0])?;
        ds.add_count_list(gs(&["Gx"]), &[10.0, 90.0])?;
        ds.add_count_list(gs(&["Gx", "Gy"]), &[40.0, 60.0])?;
        ds.add_count_list(gs(&["Gy"]), &[70.0, 30.0])?;
        Ok(ds)
    }

    #[test]
    fn test_accumulate_counts() -> Result<()> {
        let mut ds = plus_minus();
        ds.add_count_dict(gs(&["Gx"]), [("plus", 10.0), ("minus", 0.0)])?;
        ds.add_count_dict(gs(&["Gx"]), [("plus", 5.0), ("minus", 5.0)])?;
        assert_eq!(ds.len(), 1);
        let row = ds.row(&gs(&["Gx"]))?;
        assert_eq!(row.values().to_vec(), vec![15.0, 5.0]);
        assert_eq!(row.get("plus"), Some(15.0));
        assert_eq!(row.total(), 20.0);
        assert_eq!(row.fraction("minus"), Some(0.25));
        assert_eq!(row.get("up"), None);
        Ok(())
    }

    #[test]
    fn test_zero_total_dropped() -> Result<()> {
        let mut ds = filled()?;
        ds.add_count_list(gs(&["Gz"]), &[0.0, 0.0])?;
        ds.add_count_list(gs(&["Gz"]), &[0.2, 0.1])?;
        assert_eq!(ds.len(), 4);
        assert!(!ds.contains(&gs(&["Gz"])));
        // Dropped before the length check.
        ds.add_count_list(gs(&["Gz"]), &[0.0])?;
        Ok(())
    }

    #[test]
    fn test_half_totals_kept() -> Result<()> {
        let mut ds = plus_minus();
        ds.add_count_list(gs(&["Gx"]), &[0.49, 0.0])?;
        assert!(ds.is_empty());
        // Halves round away from zero.
        ds.add_count_list(gs(&["Gx"]), &[0.5, 0.0])?;
        ds.add_count_list(gs(&["Gy"]), &[0.0, -0.5])?;
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.row(&gs(&["Gx"]))?.values().to_vec(), vec![0.5, 0.0]);
        Ok(())
    }

    #[test]
    fn test_count_length_mismatch() {
        let mut ds = plus_minus();
        let err = ds.add_count_list(gs(&["Gx"]), &[1.0, 2.0, 3.0]);
        assert!(matches!(
            err,
            Err(Error::CountLengthMismatch {
                expected: 2,
                found: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_count_dict_labels_checked() {
        let mut ds = plus_minus();
        let err = ds.add_count_dict(gs(&["Gx"]), [("plus", 1.0), ("up", 1.0)]);
        assert!(matches!(err, Err(Error::UnknownSpamLabel { ref label, .. }) if label == "up"));

        let err = ds.add_count_dict(gs(&["Gx"]), [("plus", 1.0)]);
        assert!(matches!(err, Err(Error::MissingSpamLabel { ref label, .. }) if label == "minus"));
        assert!(ds.is_empty());
    }

    #[test]
    fn test_static_rejects_mutation() -> Result<()> {
        let mut ds = filled()?;
        ds.done_adding_data();
        assert!(ds.is_static());
        assert!(matches!(
            ds.add_count_list(gs(&["Gx"]), &[1.0, 1.0]),
            Err(Error::StaticDataSet)
        ));
        // Even zero totals are refused once static.
        assert!(matches!(
            ds.add_count_list(gs(&["Gx"]), &[0.0, 0.0]),
            Err(Error::StaticDataSet)
        ));
        assert!(matches!(
            ds.add_count_dict(gs(&["Gx"]), [("plus", 1.0), ("minus", 1.0)]),
            Err(Error::StaticDataSet)
        ));
        let other = filled()?;
        assert!(matches!(ds.add_counts_from(&other), Err(Error::StaticDataSet)));
        // Refused before the fraction check can skip the data.
        assert!(matches!(
            ds.add_counts_1q(gs(&["Gx"]), 90.0, 10.0),
            Err(Error::StaticDataSet)
        ));
        assert!(matches!(
            ds.add_counts_1q(gs(&["Gx"]), 10.0, 90.0),
            Err(Error::StaticDataSet)
        ));
        Ok(())
    }

    #[test]
    fn test_done_adding_data_idempotent() -> Result<()> {
        let mut ds = filled()?;
        ds.done_adding_data();
        let once = ds.to_string();
        ds.done_adding_data();
        assert_eq!(ds.to_string(), once);
        assert_eq!(ds.row(&gs(&["Gx", "Gy"]))?.values().to_vec(), vec![40.0, 60.0]);

        let mut empty = plus_minus();
        empty.done_adding_data();
        match &empty.counts {
            Counts::Static(m) => assert_eq!(m.dim(), (0, 2)),
            Counts::Rows(_) => panic!("expected static counts"),
        }
        Ok(())
    }

    #[test]
    fn test_truncate_static_shares_rows() -> Result<()> {
        let mut ds = filled()?;
        ds.done_adding_data();
        let keep = vec![gs(&["Gy"]), gs(&["Gx"]), gs(&["Gq"])];
        let t = ds.truncate(&keep, false)?;
        assert_eq!(t.keys().cloned().collect::<Vec<_>>(), keep[..2].to_vec());
        assert_eq!(t.gs_index[&gs(&["Gy"])], 3);
        assert_eq!(t.row(&gs(&["Gy"]))?.values().to_vec(), vec![70.0, 30.0]);
        match (&ds.counts, &t.counts) {
            (Counts::Static(a), Counts::Static(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected static counts"),
        }
        Ok(())
    }

    #[test]
    fn test_truncate_mutable_copies() -> Result<()> {
        let ds = filled()?;
        let keep = vec![gs(&["Gy"]), gs(&["Gy"]), gs(&["Gx"])];
        let mut t = ds.truncate(&keep, true)?;
        assert!(!t.is_static());
        assert_eq!(t.len(), 2);
        assert_eq!(t.row(&gs(&["Gy"]))?.values().to_vec(), vec![70.0, 30.0]);

        t.add_count_list(gs(&["Gy"]), &[1.0, 1.0])?;
        assert_eq!(ds.row(&gs(&["Gy"]))?.values().to_vec(), vec![70.0, 30.0]);
        Ok(())
    }

    #[test]
    fn test_truncate_missing() -> Result<()> {
        let ds = filled()?;
        let keep = vec![gs(&["Gx"]), gs(&["Gq"])];
        assert!(matches!(
            ds.truncate(&keep, true),
            Err(Error::MissingGateString(ref g)) if *g == gs(&["Gq"])
        ));
        assert_eq!(ds.truncate(&keep, false)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_copy() -> Result<()> {
        let mut ds = filled()?;
        let mut c = ds.copy();
        c.add_count_list(gs(&["Gx"]), &[1.0, 0.0])?;
        assert_eq!(ds.row(&gs(&["Gx"]))?.get("plus"), Some(10.0));
        assert_eq!(c.row(&gs(&["Gx"]))?.get("plus"), Some(11.0));

        ds.done_adding_data();
        let s = ds.copy();
        match (&ds.counts, &s.counts) {
            (Counts::Static(a), Counts::Static(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected static counts"),
        }
        Ok(())
    }

    #[test]
    fn test_add_counts_from() -> Result<()> {
        let mut ds = filled()?;
        let mut other = DataSet::new(["minus", "plus"]);
        other.add_count_list(gs(&["Gx"]), &[1.0, 2.0])?;
        other.add_count_list(gs(&["Gi"]), &[3.0, 4.0])?;
        ds.add_counts_from(&other)?;
        assert_eq!(ds.row(&gs(&["Gx"]))?.values().to_vec(), vec![12.0, 91.0]);
        assert_eq!(ds.row(&gs(&["Gi"]))?.values().to_vec(), vec![4.0, 3.0]);

        let third = DataSet::new(["plus", "zero"]);
        assert!(matches!(
            ds.add_counts_from(&third),
            Err(Error::SpamLabelMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_add_counts_1q() -> Result<()> {
        let mut ds = plus_minus();
        ds.add_counts_1q(gs(&["Gx"]), 30.0, 70.0)?;
        ds.add_counts_1q(gs(&["Gx"]), 35.0, 65.0)?;
        assert_eq!(ds.row(&gs(&["Gx"]))?.get("plus"), Some(65.0));
        // Fraction 0.9 vs 0.325: ignored.
        ds.add_counts_1q(gs(&["Gx"]), 90.0, 10.0)?;
        assert_eq!(ds.row(&gs(&["Gx"]))?.get("plus"), Some(65.0));

        let mut other = DataSet::new(["0", "1"]);
        assert!(other.add_counts_1q(gs(&["Gx"]), 1.0, 1.0).is_err());
        Ok(())
    }

    #[test]
    fn test_labels_and_display() -> Result<()> {
        let ds = filled()?;
        assert_eq!(ds.gate_labels(), vec!["Gx".to_string(), "Gy".to_string()]);
        assert_eq!(ds.spam_labels().collect::<Vec<_>>(), vec!["plus", "minus"]);
        let text = ds.to_string();
        assert!(text.starts_with("{}  :  {plus: 50, minus: 50}\n"));
        assert_eq!(text.lines().count(), 4);
        Ok(())
    }

    #[test]
    fn test_new_static() -> Result<()> {
        let m = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let ds = DataSet::new_static(
            m.clone(),
            vec![gs(&["Gx"]), gs(&["Gy"])],
            vec!["0".into(), "1".into()],
        )?;
        assert!(ds.is_static());
        assert_eq!(ds.row(&gs(&["Gy"]))?.get("0"), Some(3.0));

        let err = DataSet::new_static(m, vec![gs(&["Gx"])], vec!["0".into(), "1".into()]);
        assert!(matches!(err, Err(Error::Malformed(_))));
        Ok(())
    }

    fn assert_same(a: &DataSet, b: &DataSet) {
        assert_eq!(a.is_static(), b.is_static());
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(a.gs_index, b.gs_index);
        assert_eq!(a.sl_index, b.sl_index);
    }

    #[test]
    fn test_write_read() -> Result<()> {
        let mut ds = filled()?;
        let long = GateString::from(["Gx", "Gi"]).repeat(16);
        ds.add_count_list(long.clone(), &[3.0, 1.0])?;

        let mut buf = vec![];
        ds.write_to(&mut buf)?;
        let back = DataSet::read_from(Cursor::new(&buf))?;
        assert_same(&ds, &back);
        assert!(back.contains(&long));

        ds.done_adding_data();
        let mut buf = vec![];
        ds.write_to(&mut buf)?;
        assert_same(&ds, &DataSet::read_from(Cursor::new(&buf))?);
        Ok(())
    }

    #[test]
    fn test_read_truncated_fails() -> Result<()> {
        let ds = filled()?;
        let mut buf = vec![];
        ds.write_to(&mut buf)?;
        buf.truncate(buf.len() - 4);
        assert!(DataSet::read_from(Cursor::new(&buf)).is_err());
        Ok(())
    }

    #[test]
    fn test_save_load_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut ds = filled()?;
        ds.done_adding_data();

        let plain = dir.path().join("data.bin");
        ds.save_to(&plain)?;
        assert_same(&ds, &DataSet::load_from(&plain)?);

        let gz = dir.path().join("data.bin.gz");
        ds.save_to(&gz)?;
        let mut magic = [0u8; 2];
        File::open(&gz)?.read_exact(&mut magic)?;
        assert_eq!(magic, GZIP_MAGIC);
        assert_same(&ds, &DataSet::load_from(&gz)?);

        assert!(matches!(
            DataSet::load_from(dir.path().join("missing.gz")),
            Err(Error::Io(_))
        ));
        Ok(())
    }
}
