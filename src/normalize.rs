use serde_json::Value;
use tracing::debug;

use crate::{
    frame::{Field, FieldType, Frame},
    models::QueryTarget,
    schema::{
        ColumnarTable, DataFrameData, DisplayConfig, NotebookResult, ResultPayload, SeriesPayload,
    },
    DataSourceError, Result,
};

pub const INDEX_FIELD: &str = "Index";

/// Convert one notebook output into frames.
pub fn normalize(result: &NotebookResult, target: &QueryTarget) -> Result<Vec<Frame>> {
    let ref_id = Some(target.ref_id.clone()).filter(|r| !r.is_empty());

    let frames = match &result.payload {
        ResultPayload::Scalar { value } => {
            let mut frame = Frame::new(ref_id, None);
            frame.add_field(Field::untyped(result.id.clone(), vec![value.clone()]))?;
            vec![frame]
        }
        ResultPayload::DataFrame {
            data: DataFrameData::Series(series),
            config,
        } => series
            .iter()
            .enumerate()
            .map(|(ix, plot)| series_frame(plot, ix, config.as_ref(), ref_id.clone()))
            .collect::<Result<Vec<_>>>()?,
        ResultPayload::DataFrame {
            data: DataFrameData::Table(table),
            ..
        } => vec![table_frame(table, ref_id)?],
    };

    debug!(output = %result.id, frames = frames.len(), "normalized notebook output");
    Ok(frames)
}

/// Normalize an untyped output entry, rejecting shapes no frame can be built from.
pub fn normalize_value(value: &Value, target: &QueryTarget) -> Result<Vec<Frame>> {
    let result =
        NotebookResult::from_value(value).map_err(DataSourceError::UnrecognizedResultFormat)?;
    normalize(&result, target)
}

fn series_frame(
    plot: &SeriesPayload,
    ix: usize,
    config: Option<&DisplayConfig>,
    ref_id: Option<String>,
) -> Result<Frame> {
    let name = config.and_then(|c| c.plot_label(ix)).map(str::to_string);
    let mut frame = Frame::new(ref_id, name);

    match plot {
        SeriesPayload::Xy { x, y } => {
            if x.len() != y.len() {
                return Err(DataSourceError::MalformedResult(format!(
                    "XY series {} has {} x values and {} y values",
                    ix,
                    x.len(),
                    y.len()
                )));
            }
            let x_field = match x.first() {
                Some(Value::String(_)) => Field::new("", FieldType::Time, x.clone()),
                _ => Field::untyped("", x.clone()),
            };
            frame.add_field(x_field)?;
            frame.add_field(Field::untyped("", y.clone()))?;
        }
        SeriesPayload::Index { y } => {
            let index = (0..y.len()).map(Value::from).collect();
            frame.add_field(Field::new(INDEX_FIELD, FieldType::Number, index))?;
            frame.add_field(Field::untyped("", y.clone()))?;
        }
    }

    Ok(frame)
}

fn table_frame(table: &ColumnarTable, ref_id: Option<String>) -> Result<Frame> {
    let mut frame = Frame::new(ref_id, None);

    for (col, column) in table.columns.iter().enumerate() {
        let values = table
            .values
            .iter()
            .enumerate()
            .map(|(row, tuple)| {
                tuple.get(col).cloned().ok_or_else(|| {
                    DataSourceError::MalformedResult(format!(
                        "row {} has no value for column '{}'",
                        row, column.name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        frame.add_field(Field::new(
            column.name.clone(),
            FieldType::from_column_type(&column.kind),
            values,
        ))?;
    }

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn target() -> QueryTarget {
        QueryTarget {
            ref_id: "123".to_string(),
            ..QueryTarget::new("/test/notebook", "test_output")
        }
    }

    fn graph_config() -> Value {
        json!({
            "title": "Horizontal Bar Chart",
            "graph": {
                "axis_labels": ["Labels", "Values"],
                "tick_labels": [{ "x": 0, "label": "label 1" }],
                "orientation": "HORIZONTAL",
                "plot_style": ["BAR"],
                "plot_labels": ["plot1"]
            }
        })
    }

    #[test]
    fn scalar_becomes_single_cell_frame() {
        let frames = normalize_value(
            &json!({ "type": "scalar", "id": "x", "value": 2.5 }),
            &target(),
        )
        .unwrap();

        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.fields.len(), 1);
        assert_eq!(frame.fields[0].name, "x");
        assert_eq!(frame.fields[0].values, vec![json!(2.5)]);
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.ref_id.as_deref(), Some("123"));
    }

    #[test]
    fn xy_series_with_numeric_x() {
        let frames = normalize_value(
            &json!({
                "type": "data_frame",
                "id": "horizontal_graph",
                "data": [{ "format": "XY", "x": [0, 1, 2, 3], "y": [950, 412, 1390, 1009] }],
                "config": graph_config()
            }),
            &target(),
        )
        .unwrap();

        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.name.as_deref(), Some("plot1"));
        assert_eq!(frame.fields.len(), 2);
        assert_eq!(frame.len(), 4);
        assert_eq!(frame.fields[0].field_type, FieldType::Number);
        assert_eq!(frame.fields[1].values[0], json!(950));
    }

    #[test]
    fn xy_series_with_string_x_is_time() {
        let frames = normalize_value(
            &json!({
                "type": "data_frame",
                "id": "trend",
                "data": [{
                    "format": "XY",
                    "x": ["2020-01-01T00:00:00Z", "2020-01-02T00:00:00Z"],
                    "y": [1, 2]
                }]
            }),
            &target(),
        )
        .unwrap();

        assert_eq!(frames[0].fields[0].field_type, FieldType::Time);
        assert_eq!(frames[0].name, None);
    }

    #[test]
    fn index_series_gets_implicit_index() {
        let frames = normalize_value(
            &json!({
                "type": "data_frame",
                "id": "horizontal_graph",
                "data": [{ "format": "INDEX", "y": [950, 412, 1390, 1009] }],
                "config": graph_config()
            }),
            &target(),
        )
        .unwrap();

        let frame = &frames[0];
        assert_eq!(frame.name.as_deref(), Some("plot1"));
        assert_eq!(frame.fields[0].name, INDEX_FIELD);
        assert_eq!(
            frame.fields[0].values,
            vec![json!(0), json!(1), json!(2), json!(3)]
        );
        assert_eq!(
            frame.fields[1].values,
            vec![json!(950), json!(412), json!(1390), json!(1009)]
        );
    }

    #[test]
    fn each_series_becomes_its_own_frame() {
        let frames = normalize_value(
            &json!({
                "type": "data_frame",
                "id": "multi",
                "data": [
                    { "format": "INDEX", "y": [1, 2] },
                    { "format": "XY", "x": [5, 6, 7], "y": [8, 9, 10] }
                ],
                "config": { "graph": { "plot_labels": ["first"] } }
            }),
            &target(),
        )
        .unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].name.as_deref(), Some("first"));
        assert_eq!(frames[0].len(), 2);
        assert_eq!(frames[1].name, None);
        assert_eq!(frames[1].len(), 3);
    }

    #[test]
    fn columnar_table_uses_column_types() {
        let frames = normalize_value(
            &json!({
                "type": "data_frame",
                "id": "table",
                "data": {
                    "columns": [{ "name": "a", "type": "number" }, { "name": "b", "type": "string" }],
                    "values": [[1, "x"], [2, "y"]]
                }
            }),
            &target(),
        )
        .unwrap();

        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        let a = frame.field("a").unwrap();
        assert_eq!(a.field_type, FieldType::Number);
        assert_eq!(a.values, vec![json!(1), json!(2)]);
        let b = frame.field("b").unwrap();
        assert_eq!(b.field_type, FieldType::String);
        assert_eq!(b.values, vec![json!("x"), json!("y")]);
    }

    #[test]
    fn short_table_row_is_malformed() {
        let err = normalize_value(
            &json!({
                "type": "data_frame",
                "id": "table",
                "data": {
                    "columns": [{ "name": "a", "type": "number" }, { "name": "b", "type": "string" }],
                    "values": [[1, "x"], [2]]
                }
            }),
            &target(),
        )
        .unwrap_err();
        assert!(matches!(err, DataSourceError::MalformedResult(_)));
    }

    #[test]
    fn mismatched_xy_lengths_are_malformed() {
        let err = normalize_value(
            &json!({
                "type": "data_frame",
                "id": "bad",
                "data": [{ "format": "XY", "x": [0, 1, 2], "y": [1, 2] }]
            }),
            &target(),
        )
        .unwrap_err();
        assert!(matches!(err, DataSourceError::MalformedResult(_)));
    }

    #[test]
    fn unknown_shapes_are_unrecognized() {
        for value in [
            json!({ "type": "image", "id": "plot", "data": "base64" }),
            json!({ "type": "data_frame", "id": "test", "data": { "values": [1, 2, 3] } }),
            json!([1, 2, 3]),
        ] {
            let err = normalize_value(&value, &target()).unwrap_err();
            assert!(matches!(err, DataSourceError::UnrecognizedResultFormat(_)));
        }
    }

    #[test]
    fn normalizing_twice_is_identical() {
        let value = json!({
            "type": "data_frame",
            "id": "graph",
            "data": [{ "format": "XY", "x": [0, 1], "y": [2, 3] }]
        });
        assert_eq!(
            normalize_value(&value, &target()).unwrap(),
            normalize_value(&value, &target()).unwrap()
        );
    }
}
