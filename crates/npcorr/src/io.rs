//! Writing and reading correlation results.
//!
//! A result is a [`ResultTable`]: named per-bin columns plus the metadata
//! needed to check that a table is read back into a compatible correlation.
//! The table layer is format agnostic; [`JsonSink`] and [`JsonSource`]
//! implement it with `serde_json`.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// Everything about a correlation that isn't a per-bin column
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    /// `NN`, `KKK`, ...
    pub kind: String,
    pub bin_type: String,
    pub metric: String,
    /// coordinate system of the processed catalogs (None if nothing was
    /// processed)
    pub coords: Option<String>,
    pub sep_units: Option<String>,
    pub nbins: usize,
    pub min_sep: f64,
    pub max_sep: f64,
    pub bin_size: f64,
    pub bin_slop: f64,
    pub tot: f64,
    /// the shape of the bin grid
    pub shape: Vec<usize>,
    /// the triangle-shape axes of a 3-point binning (`min_u`, `nubins`, ...)
    #[serde(default)]
    pub shape_axes: BTreeMap<String, f64>,
}

/// The columns and metadata of a correlation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub columns: BTreeMap<String, Vec<f64>>,
    pub meta: TableMeta,
}

impl ResultTable {
    /// the number of bins (the length of every column)
    pub fn n_rows(&self) -> usize {
        self.meta.shape.iter().product()
    }
}

/// Somewhere a table can be written to
pub trait ResultSink {
    fn write_table(&mut self, table: &ResultTable) -> Result<(), Error>;
}

/// Somewhere a table can be read from
pub trait ResultSource {
    fn read_table(&mut self) -> Result<ResultTable, Error>;
}

/// Writes tables as JSON documents
pub struct JsonSink<W: Write> {
    writer: W,
    pretty: bool,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        JsonSink { writer, pretty: false }
    }

    /// indent the output
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ResultSink for JsonSink<W> {
    fn write_table(&mut self, table: &ResultTable) -> Result<(), Error> {
        if let Some((name, _)) = table
            .columns
            .iter()
            .find(|(_, col)| col.iter().any(|v| !v.is_finite()))
        {
            return Err(Error::serialization(format!(
                "column {name} holds non-finite values, which JSON can't represent"
            )));
        }
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, table)?;
        } else {
            serde_json::to_writer(&mut self.writer, table)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Reads tables written by [`JsonSink`]
pub struct JsonSource<R: Read> {
    reader: R,
}

impl<R: Read> JsonSource<R> {
    pub fn new(reader: R) -> Self {
        JsonSource { reader }
    }
}

impl<R: Read> ResultSource for JsonSource<R> {
    fn read_table(&mut self) -> Result<ResultTable, Error> {
        let table: ResultTable = serde_json::from_reader(&mut self.reader)?;
        let n = table.n_rows();
        if let Some((name, col)) = table.columns.iter().find(|(_, col)| col.len() != n) {
            return Err(Error::serialization(format!(
                "column {name} has {} rows, expected {n}",
                col.len()
            )));
        }
        Ok(table)
    }
}

/// the `'static` spelling of a known column name
pub(crate) fn static_name(name: &str, known: &[&[&'static str]]) -> Option<&'static str> {
    known
        .iter()
        .flat_map(|names| names.iter())
        .find(|&&k| k == name)
        .copied()
}
