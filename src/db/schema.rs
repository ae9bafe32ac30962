use chrono::NaiveDateTime;

use super::Dialect;
use crate::workbook::{CellValue, Row};

/// Storage type of a destination column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    BigInt,
    Double,
    Timestamp,
    Text,
}

impl SqlType {
    /// Storage type for a single cell, `None` for nulls
    fn of(cell: &CellValue) -> Option<SqlType> {
        match cell {
            CellValue::Null => None,
            CellValue::Bool(_) => Some(SqlType::Boolean),
            CellValue::Int(_) => Some(SqlType::BigInt),
            CellValue::Float(_) => Some(SqlType::Double),
            CellValue::DateTime(_) => Some(SqlType::Timestamp),
            CellValue::Text(_) => Some(SqlType::Text),
        }
    }

    /// Find the narrowest type that stores values of both types
    pub fn common_type(&self, other: &SqlType) -> SqlType {
        use SqlType::*;
        match (self, other) {
            (a, b) if a == b => *a,
            (BigInt, Double) | (Double, BigInt) => Double,
            _ => Text,
        }
    }

    /// Column type name in the given dialect
    pub fn type_name(&self, dialect: Dialect) -> &'static str {
        match (self, dialect) {
            (SqlType::Boolean, Dialect::Mssql) => "BIT",
            (SqlType::Boolean, _) => "BOOLEAN",
            (SqlType::BigInt, _) => "BIGINT",
            (SqlType::Double, Dialect::MySql) => "DOUBLE",
            (SqlType::Double, Dialect::Postgres) => "DOUBLE PRECISION",
            (SqlType::Double, Dialect::Mssql) => "FLOAT",
            #[cfg(test)]
            (SqlType::Double, Dialect::Sqlite) => "REAL",
            (SqlType::Timestamp, Dialect::MySql) => "DATETIME(6)",
            (SqlType::Timestamp, Dialect::Mssql) => "DATETIME2",
            (SqlType::Timestamp, _) => "TIMESTAMP",
            (SqlType::Text, Dialect::Mssql) => "NVARCHAR(MAX)",
            (SqlType::Text, _) => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
}

/// Column layout of a destination table, fixed by the chunk that creates it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<Column>,
}

impl TableSchema {
    /// Derive storage types from every row of a sheet
    ///
    /// Columns with no non-null value are stored as text.
    pub fn infer(column_names: &[String], rows: &[Row]) -> Self {
        let columns = column_names
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let sql_type = rows
                    .iter()
                    .filter_map(|row| row.get(idx).and_then(SqlType::of))
                    .reduce(|acc, t| acc.common_type(&t))
                    .unwrap_or(SqlType::Text);
                Column {
                    name: name.clone(),
                    sql_type,
                }
            })
            .collect();

        TableSchema { columns }
    }

    /// Columns whose values in `rows` need a wider type than the one stored
    ///
    /// Yields `(column, stored type, needed type)`; nulls fit any column.
    pub fn unfit_columns(&self, rows: &[Row]) -> Vec<(String, SqlType, SqlType)> {
        self.columns
            .iter()
            .enumerate()
            .filter_map(|(idx, column)| {
                let needed = rows
                    .iter()
                    .filter_map(|row| row.get(idx).and_then(SqlType::of))
                    .fold(column.sql_type, |acc, t| acc.common_type(&t));
                (needed != column.sql_type).then(|| (column.name.clone(), column.sql_type, needed))
            })
            .collect()
    }

    pub fn drop_table_sql(&self, dialect: Dialect, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", dialect.quote_identifier(table))
    }

    /// Generate DDL statement for creating a table
    pub fn create_table_sql(&self, dialect: Dialect, table: &str) -> String {
        let column_defs: Vec<String> = self
            .columns
            .iter()
            .map(|col| {
                format!(
                    "  {} {} NULL",
                    dialect.quote_identifier(&col.name),
                    col.sql_type.type_name(dialect)
                )
            })
            .collect();

        format!(
            "CREATE TABLE {} (\n{}\n)",
            dialect.quote_identifier(table),
            column_defs.join(",\n")
        )
    }

    /// Build a multi-row INSERT: INSERT INTO t (c1, c2) VALUES (p1, p2), (p3, p4), ...
    pub fn insert_sql(&self, dialect: Dialect, table: &str, row_count: usize) -> String {
        let column_list: Vec<String> = self
            .columns
            .iter()
            .map(|c| dialect.quote_identifier(&c.name))
            .collect();

        let num_columns = self.columns.len();
        let mut param_idx = 1;
        let mut value_groups = Vec::with_capacity(row_count);
        for _ in 0..row_count {
            let placeholders: Vec<String> = (0..num_columns)
                .map(|_| {
                    let placeholder = dialect.placeholder(param_idx);
                    param_idx += 1;
                    placeholder
                })
                .collect();
            value_groups.push(format!("({})", placeholders.join(", ")));
        }

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            dialect.quote_identifier(table),
            column_list.join(", "),
            value_groups.join(", ")
        )
    }
}

/// A cell prepared for binding into a column of a known type
///
/// Nulls carry the column's type so drivers declare the parameter with the
/// column's storage type.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Bool(Option<bool>),
    Int(Option<i64>),
    Float(Option<f64>),
    Timestamp(Option<NaiveDateTime>),
    Text(Option<String>),
}

impl BindValue {
    /// Prepare `cell` for a column stored as `sql_type`
    ///
    /// Values keep their own type unless the column can only store them in
    /// another form: everything is rendered for text columns and integers are
    /// widened for double columns. Anything else is passed through and left to
    /// the destination to accept or reject.
    pub fn for_column(cell: &CellValue, sql_type: SqlType) -> BindValue {
        match (cell, sql_type) {
            (CellValue::Null, SqlType::Boolean) => BindValue::Bool(None),
            (CellValue::Null, SqlType::BigInt) => BindValue::Int(None),
            (CellValue::Null, SqlType::Double) => BindValue::Float(None),
            (CellValue::Null, SqlType::Timestamp) => BindValue::Timestamp(None),
            (CellValue::Null, SqlType::Text) => BindValue::Text(None),
            (cell, SqlType::Text) => BindValue::Text(Some(cell.to_string())),
            (CellValue::Int(i), SqlType::Double) => BindValue::Float(Some(*i as f64)),
            (CellValue::Bool(b), _) => BindValue::Bool(Some(*b)),
            (CellValue::Int(i), _) => BindValue::Int(Some(*i)),
            (CellValue::Float(f), _) => BindValue::Float(Some(*f)),
            (CellValue::DateTime(dt), _) => BindValue::Timestamp(Some(*dt)),
            (CellValue::Text(s), _) => BindValue::Text(Some(s.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_unfit_columns_need_wider_types() {
        let schema = TableSchema::infer(
            &names(&["id", "label", "score"]),
            &[vec![
                CellValue::Int(1),
                CellValue::Text("a".to_string()),
                CellValue::Float(0.5),
            ]],
        );

        let later = vec![
            vec![CellValue::Float(2.5), CellValue::Int(7), CellValue::Int(3)],
            vec![CellValue::Null, CellValue::Null, CellValue::Null],
        ];
        assert_eq!(
            schema.unfit_columns(&later),
            vec![("id".to_string(), SqlType::BigInt, SqlType::Double)]
        );

        let fitting = vec![vec![CellValue::Int(2), CellValue::Null, CellValue::Float(1.0)]];
        assert!(schema.unfit_columns(&fitting).is_empty());
    }

    #[test]
    fn test_infer_column_types() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        let rows = vec![
            vec![
                CellValue::Int(1),
                CellValue::Float(2.5),
                CellValue::Bool(true),
                CellValue::DateTime(ts),
                CellValue::Text("a".into()),
                CellValue::Null,
            ],
            vec![
                CellValue::Int(2),
                CellValue::Int(3),
                CellValue::Null,
                CellValue::DateTime(ts),
                CellValue::Int(7),
                CellValue::Null,
            ],
        ];

        let schema = TableSchema::infer(
            &names(&["id", "amount", "active", "created", "mixed", "empty"]),
            &rows,
        );

        let types: Vec<SqlType> = schema.columns.iter().map(|c| c.sql_type).collect();
        assert_eq!(
            types,
            vec![
                SqlType::BigInt,
                SqlType::Double,
                SqlType::Boolean,
                SqlType::Timestamp,
                SqlType::Text,
                SqlType::Text,
            ]
        );
        assert_eq!(schema.columns[0].name, "id");
    }

    #[test]
    fn test_type_promotion() {
        assert_eq!(SqlType::BigInt.common_type(&SqlType::Double), SqlType::Double);
        assert_eq!(SqlType::Double.common_type(&SqlType::BigInt), SqlType::Double);
        assert_eq!(SqlType::Boolean.common_type(&SqlType::BigInt), SqlType::Text);
        assert_eq!(SqlType::Timestamp.common_type(&SqlType::Text), SqlType::Text);
        assert_eq!(SqlType::Boolean.common_type(&SqlType::Boolean), SqlType::Boolean);
    }

    #[test]
    fn test_generate_ddl_per_dialect() {
        let schema = TableSchema {
            columns: vec![
                Column {
                    name: "id".to_string(),
                    sql_type: SqlType::BigInt,
                },
                Column {
                    name: "price".to_string(),
                    sql_type: SqlType::Double,
                },
                Column {
                    name: "note".to_string(),
                    sql_type: SqlType::Text,
                },
            ],
        };

        let pg = schema.create_table_sql(Dialect::Postgres, "Sheet1");
        assert!(pg.starts_with("CREATE TABLE \"Sheet1\""));
        assert!(pg.contains("\"id\" BIGINT NULL"));
        assert!(pg.contains("\"price\" DOUBLE PRECISION NULL"));
        assert!(pg.contains("\"note\" TEXT NULL"));

        let mysql = schema.create_table_sql(Dialect::MySql, "Sheet1");
        assert!(mysql.contains("`price` DOUBLE NULL"));

        let mssql = schema.create_table_sql(Dialect::Mssql, "Sheet1");
        assert!(mssql.starts_with("CREATE TABLE [Sheet1]"));
        assert!(mssql.contains("[note] NVARCHAR(MAX) NULL"));
        assert!(mssql.contains("[price] FLOAT NULL"));

        assert_eq!(
            schema.drop_table_sql(Dialect::Mssql, "Sheet1"),
            "DROP TABLE IF EXISTS [Sheet1]"
        );
    }

    #[test]
    fn test_insert_sql_numbers_placeholders_across_rows() {
        let schema = TableSchema::infer(&names(&["a", "b"]), &[]);

        assert_eq!(
            schema.insert_sql(Dialect::Postgres, "t", 2),
            "INSERT INTO \"t\" (\"a\", \"b\") VALUES ($1, $2), ($3, $4)"
        );
        assert_eq!(
            schema.insert_sql(Dialect::Mssql, "t", 2),
            "INSERT INTO [t] ([a], [b]) VALUES (@P1, @P2), (@P3, @P4)"
        );
        assert_eq!(
            schema.insert_sql(Dialect::MySql, "t", 1),
            "INSERT INTO `t` (`a`, `b`) VALUES (?, ?)"
        );
    }

    #[test]
    fn test_bind_values_follow_column_type() {
        assert_eq!(
            BindValue::for_column(&CellValue::Null, SqlType::BigInt),
            BindValue::Int(None)
        );
        assert_eq!(
            BindValue::for_column(&CellValue::Int(4), SqlType::Double),
            BindValue::Float(Some(4.0))
        );
        assert_eq!(
            BindValue::for_column(&CellValue::Int(4), SqlType::Text),
            BindValue::Text(Some("4".to_string()))
        );
        assert_eq!(
            BindValue::for_column(&CellValue::Bool(false), SqlType::Text),
            BindValue::Text(Some("False".to_string()))
        );
        // Values the column cannot hold are passed through unchanged
        assert_eq!(
            BindValue::for_column(&CellValue::Text("n/a".into()), SqlType::BigInt),
            BindValue::Text(Some("n/a".to_string()))
        );
    }
}
