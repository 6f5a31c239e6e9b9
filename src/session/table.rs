//! Conceptual table retrieval.
//!
//! SMI tables are walked as columns: every cell of `table.entry.column` lives
//! at `<base>.1.<column>.<instance>`. [`TableBuilder`] folds walked varbinds
//! into rows keyed by instance suffix, with optional per-column names and
//! value coercions.

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use super::Session;
use crate::ber::decode_counter64;
use crate::error::{Error, Result};
use crate::oid::{Oid, oid_in_subtree};
use crate::util::hex;
use crate::value::Value;
use crate::varbind::VarBind;

/// Cells of one row keyed by column name or number.
pub type Row = BTreeMap<String, Cell>;

/// Rows keyed by dotted instance suffix (`"1"`, `"10.0.0.1"`, ...).
pub type Table = BTreeMap<String, Row>;

/// A table cell after optional coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// The value as received.
    Raw(Value),
    /// Octet string rendered as text.
    Text(String),
    /// Octet string rendered as lowercase hex.
    Hex(String),
    /// Counter64 or an octet string holding a big-endian unsigned integer.
    Unsigned64(u64),
    /// Enumeration label.
    Label(String),
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Raw(value) => write!(f, "{}", value),
            Cell::Text(s) | Cell::Hex(s) | Cell::Label(s) => f.write_str(s),
            Cell::Unsigned64(n) => write!(f, "{}", n),
        }
    }
}

/// How a column's values are converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coercion {
    /// Bytes as (lossy) UTF-8 text; other values via their display form.
    String,
    /// Bytes as hex.
    Hex,
    /// 64-bit unsigned, decoded from bytes with the Counter64 rules.
    Uint64,
    /// Integer values mapped to labels; unmapped values stay raw.
    Enum(BTreeMap<i64, String>),
}

impl Coercion {
    /// Convert one value.
    pub fn apply(&self, value: &Value) -> Result<Cell> {
        let cell = match self {
            Coercion::String => match value.as_bytes() {
                Some(bytes) => Cell::Text(String::from_utf8_lossy(bytes).into_owned()),
                None => Cell::Text(value.to_string()),
            },
            Coercion::Hex => match value.as_bytes() {
                Some(bytes) => Cell::Hex(hex::encode(bytes)),
                None => Cell::Raw(value.clone()),
            },
            Coercion::Uint64 => match value.as_bytes() {
                Some(bytes) => Cell::Unsigned64(decode_counter64(bytes)?),
                None => value
                    .as_u64()
                    .map(Cell::Unsigned64)
                    .unwrap_or_else(|| Cell::Raw(value.clone())),
            },
            Coercion::Enum(labels) => value
                .as_i32()
                .and_then(|n| labels.get(&i64::from(n)))
                .map(|label| Cell::Label(label.clone()))
                .unwrap_or_else(|| Cell::Raw(value.clone())),
        };
        Ok(cell)
    }
}

/// Name and coercion of one table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column number under the entry OID.
    pub index: u32,
    /// Key used in rows instead of the column number.
    pub name: Option<String>,
    pub coercion: Option<Coercion>,
}

impl ColumnSpec {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            name: None,
            coercion: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn coercion(mut self, coercion: Coercion) -> Self {
        self.coercion = Some(coercion);
        self
    }
}

/// Options for [`Session::table`] and [`Session::table_columns`].
#[derive(Debug, Clone)]
pub struct TableOptions {
    /// GETBULK max-repetitions per walk request (default: 10)
    pub max_repetitions: u32,
    /// Column names and coercions; required for `table_columns`
    pub columns: Vec<ColumnSpec>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            max_repetitions: 10,
            columns: Vec::new(),
        }
    }
}

/// Accumulates walked varbinds into a [`Table`].
///
/// ```
/// use snmp_session::{oid, Cell, TableBuilder, Value, VarBind};
///
/// let mut builder = TableBuilder::new(&oid!(1, 3, 6, 1, 2, 1, 2, 2));
/// let _ = builder.feed(&[
///     VarBind::new(oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 2, 1), Value::from("eth0")),
///     VarBind::new(oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 2, 2), Value::from("eth1")),
/// ]);
/// let table = builder.finish().unwrap();
/// assert_eq!(table["1"]["2"], Cell::Raw(Value::from("eth0")));
/// assert_eq!(table["2"]["2"], Cell::Raw(Value::from("eth1")));
/// ```
#[derive(Debug)]
pub struct TableBuilder {
    row_oid: Oid,
    columns: BTreeMap<u32, ColumnSpec>,
    table: Table,
    error: Option<Error>,
}

impl TableBuilder {
    /// Builder for the table rooted at `base` (rows under `base.1`).
    pub fn new(base: &Oid) -> Self {
        Self {
            row_oid: base.child(1),
            columns: BTreeMap::new(),
            table: Table::new(),
            error: None,
        }
    }

    pub fn with_columns(mut self, columns: impl IntoIterator<Item = ColumnSpec>) -> Self {
        self.columns
            .extend(columns.into_iter().map(|spec| (spec.index, spec)));
        self
    }

    /// The entry OID rows live under.
    pub fn row_oid(&self) -> &Oid {
        &self.row_oid
    }

    /// Feed a batch from a walk over the whole table.
    pub fn feed(&mut self, varbinds: &[VarBind]) -> ControlFlow<()> {
        let row_oid = self.row_oid.clone();
        self.feed_within(&row_oid, varbinds)
    }

    /// Feed a batch from a walk bounded by `bound` (a column or the entry).
    ///
    /// Breaks at the first varbind outside `bound`, and at the first
    /// exception or coercion failure, which is kept and reported by
    /// [`finish`](Self::finish). Once an error is kept, later batches are
    /// ignored.
    pub fn feed_within(&mut self, bound: &Oid, varbinds: &[VarBind]) -> ControlFlow<()> {
        if self.error.is_some() {
            return ControlFlow::Break(());
        }

        for vb in varbinds {
            if !oid_in_subtree(bound, &vb.oid) {
                return ControlFlow::Break(());
            }
            if let Some(exception) = vb.exception() {
                self.error = Some(Error::VarbindException {
                    oid: vb.oid.clone(),
                    exception,
                });
                return ControlFlow::Break(());
            }
            if let Err(e) = self.record(vb) {
                self.error = Some(e);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn record(&mut self, vb: &VarBind) -> Result<()> {
        let Some([column, instance @ ..]) = vb.oid.suffix(&self.row_oid) else {
            return Ok(());
        };
        if *column == 0 || instance.is_empty() {
            return Ok(());
        }

        let spec = self.columns.get(column);
        let key = spec
            .and_then(|s| s.name.clone())
            .unwrap_or_else(|| column.to_string());
        let cell = match spec.and_then(|s| s.coercion.as_ref()) {
            Some(coercion) => coercion.apply(&vb.value)?,
            None => Cell::Raw(vb.value.clone()),
        };

        self.table
            .entry(Oid::from_slice(instance).to_string())
            .or_default()
            .insert(key, cell);
        Ok(())
    }

    /// Rows gathered so far.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// The table, or the first error seen while feeding.
    pub fn finish(self) -> Result<Table> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.table),
        }
    }
}

impl Session {
    /// Retrieve a whole table with one walk over its entry OID.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use snmp_session::{ColumnSpec, Session, TableOptions, oid};
    /// # async fn example(session: Session) -> snmp_session::Result<()> {
    /// let options = TableOptions {
    ///     columns: vec![ColumnSpec::new(2).name("ifDescr")],
    ///     ..TableOptions::default()
    /// };
    /// let if_table = session.table(&oid!(1, 3, 6, 1, 2, 1, 2, 2), &options).await?;
    /// for (index, row) in &if_table {
    ///     println!("{} {}", index, row["ifDescr"]);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[tracing::instrument(skip(self, options), err, fields(snmp.target = %self.target(), snmp.oid = %base))]
    pub async fn table(&self, base: &Oid, options: &TableOptions) -> Result<Table> {
        let mut builder = TableBuilder::new(base).with_columns(options.columns.iter().cloned());
        let row_oid = builder.row_oid().clone();

        self.walk(&row_oid, options.max_repetitions, |varbinds| builder.feed(varbinds))
            .await?;
        builder.finish()
    }

    /// Retrieve only the listed columns, one walk per column.
    #[tracing::instrument(skip(self, options), err, fields(snmp.target = %self.target(), snmp.oid = %base, snmp.columns = options.columns.len()))]
    pub async fn table_columns(&self, base: &Oid, options: &TableOptions) -> Result<Table> {
        if options.columns.is_empty() {
            return Err(Error::request_invalid("no table columns requested"));
        }

        let mut builder = TableBuilder::new(base).with_columns(options.columns.iter().cloned());
        let row_oid = builder.row_oid().clone();

        for spec in &options.columns {
            let column = row_oid.child(spec.index);
            self.walk(&column, options.max_repetitions, |varbinds| {
                builder.feed_within(&column, varbinds)
            })
            .await?;
            if builder.error.is_some() {
                break;
            }
        }
        builder.finish()
    }
}
