// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Translation of Arrow record batches into row tuples.
//!
//! Used in row-stream mode for columnar chunks. Types without a direct
//! [`Value`] mapping are rendered with Arrow's display formatter.

use crate::error::{Error, Result};
use crate::types::value::{Row, Value};
use arrow_array::cast::AsArray;
use arrow_array::types::{
    Date32Type, Decimal128Type, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type,
    Int8Type, TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow_array::{Array, RecordBatch};
use arrow_cast::display::{ArrayFormatter, FormatOptions};
use arrow_schema::{DataType, TimeUnit};

/// Convert every row of `batch` into a [`Row`], preserving row order.
pub fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<Row>> {
    let columns = batch
        .columns()
        .iter()
        .map(|column| column_values(column.as_ref()))
        .collect::<Result<Vec<_>>>()?;

    let mut rows: Vec<Row> = (0..batch.num_rows())
        .map(|_| Vec::with_capacity(columns.len()))
        .collect();

    for column in columns {
        for (row, value) in rows.iter_mut().zip(column) {
            row.push(value);
        }
    }

    Ok(rows)
}

fn map_cells(array: &dyn Array, cell: impl Fn(usize) -> Value) -> Vec<Value> {
    (0..array.len())
        .map(|i| {
            if array.is_null(i) {
                Value::Null
            } else {
                cell(i)
            }
        })
        .collect()
}

fn column_values(array: &dyn Array) -> Result<Vec<Value>> {
    let values = match array.data_type() {
        DataType::Null => vec![Value::Null; array.len()],
        DataType::Boolean => {
            let a = array.as_boolean();
            map_cells(array, |i| Value::Boolean(a.value(i)))
        }
        DataType::Int8 => {
            let a = array.as_primitive::<Int8Type>();
            map_cells(array, |i| Value::Int64(a.value(i).into()))
        }
        DataType::Int16 => {
            let a = array.as_primitive::<Int16Type>();
            map_cells(array, |i| Value::Int64(a.value(i).into()))
        }
        DataType::Int32 => {
            let a = array.as_primitive::<Int32Type>();
            map_cells(array, |i| Value::Int64(a.value(i).into()))
        }
        DataType::Int64 => {
            let a = array.as_primitive::<Int64Type>();
            map_cells(array, |i| Value::Int64(a.value(i)))
        }
        DataType::UInt8 => {
            let a = array.as_primitive::<UInt8Type>();
            map_cells(array, |i| Value::Int64(a.value(i).into()))
        }
        DataType::UInt16 => {
            let a = array.as_primitive::<UInt16Type>();
            map_cells(array, |i| Value::Int64(a.value(i).into()))
        }
        DataType::UInt32 => {
            let a = array.as_primitive::<UInt32Type>();
            map_cells(array, |i| Value::Int64(a.value(i).into()))
        }
        DataType::UInt64 => {
            let a = array.as_primitive::<UInt64Type>();
            map_cells(array, |i| Value::UInt64(a.value(i)))
        }
        DataType::Float32 => {
            let a = array.as_primitive::<Float32Type>();
            map_cells(array, |i| Value::Float64(a.value(i).into()))
        }
        DataType::Float64 => {
            let a = array.as_primitive::<Float64Type>();
            map_cells(array, |i| Value::Float64(a.value(i)))
        }
        DataType::Utf8 => {
            let a = array.as_string::<i32>();
            map_cells(array, |i| Value::Utf8(a.value(i).to_string()))
        }
        DataType::LargeUtf8 => {
            let a = array.as_string::<i64>();
            map_cells(array, |i| Value::Utf8(a.value(i).to_string()))
        }
        DataType::Utf8View => {
            let a = array.as_string_view();
            map_cells(array, |i| Value::Utf8(a.value(i).to_string()))
        }
        DataType::Binary => {
            let a = array.as_binary::<i32>();
            map_cells(array, |i| Value::Binary(a.value(i).to_vec()))
        }
        DataType::LargeBinary => {
            let a = array.as_binary::<i64>();
            map_cells(array, |i| Value::Binary(a.value(i).to_vec()))
        }
        DataType::Date32 => {
            let a = array.as_primitive::<Date32Type>();
            map_cells(array, |i| Value::Date32(a.value(i)))
        }
        DataType::Timestamp(unit, _) => timestamp_micros(array, unit),
        DataType::Decimal128(_, _) => {
            let a = array.as_primitive::<Decimal128Type>();
            map_cells(array, |i| Value::Decimal(a.value_as_string(i)))
        }
        other => {
            let formatter = ArrayFormatter::try_new(array, &FormatOptions::default())
                .map_err(|e| {
                    Error::decode(0, format!("Cannot render column of type {}: {}", other, e))
                })?;
            map_cells(array, |i| Value::Utf8(formatter.value(i).to_string()))
        }
    };

    Ok(values)
}

fn timestamp_micros(array: &dyn Array, unit: &TimeUnit) -> Vec<Value> {
    match unit {
        TimeUnit::Second => {
            let a = array.as_primitive::<TimestampSecondType>();
            map_cells(array, |i| {
                Value::TimestampMicros(a.value(i).saturating_mul(1_000_000))
            })
        }
        TimeUnit::Millisecond => {
            let a = array.as_primitive::<TimestampMillisecondType>();
            map_cells(array, |i| Value::TimestampMicros(a.value(i).saturating_mul(1_000)))
        }
        TimeUnit::Microsecond => {
            let a = array.as_primitive::<TimestampMicrosecondType>();
            map_cells(array, |i| Value::TimestampMicros(a.value(i)))
        }
        TimeUnit::Nanosecond => {
            let a = array.as_primitive::<TimestampNanosecondType>();
            map_cells(array, |i| Value::TimestampMicros(a.value(i) / 1_000))
        }
    }
}
