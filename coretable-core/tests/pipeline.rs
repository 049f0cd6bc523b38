use coretable_core::{
    ColumnDef, ColumnTypeName, CoreTable, ErrorValue, LinearInterpolation, SequentialIds, TableOptions,
    TransformType, Value,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn numeric(slugs: &[&str]) -> Vec<ColumnDef> {
    slugs
        .iter()
        .map(|slug| ColumnDef::new(*slug, ColumnTypeName::Numeric))
        .collect()
}

fn series(text: &str) -> CoreTable {
    CoreTable::new(
        text,
        vec![
            ColumnDef::new("entityName", ColumnTypeName::EntityName),
            ColumnDef::new("year", ColumnTypeName::Year),
            ColumnDef::new("gdp", ColumnTypeName::Numeric),
        ],
    )
}

#[test]
fn concat_fills_missing_columns_with_placeholders() {
    let a = CoreTable::new("x,y\n1,2", numeric(&["x", "y"]));
    let b = CoreTable::new("y,z\n3,4", numeric(&["y", "z"]));
    let combined = a.concat(&[b], None);

    assert_eq!(combined.column_slugs(), &["x", "y", "z"]);
    assert_eq!(combined.num_rows(), 2);
    assert_eq!(
        combined.get_values_for("x").unwrap(),
        &[Value::Number(1.0), Value::Invalid(ErrorValue::MissingValuePlaceholder)]
    );
    assert_eq!(combined.get_values_for("y").unwrap(), &[Value::Number(2.0), Value::Number(3.0)]);
    assert_eq!(
        combined.get_values_for("z").unwrap(),
        &[Value::Invalid(ErrorValue::MissingValuePlaceholder), Value::Number(4.0)]
    );
    assert_eq!(combined.transform_category(), TransformType::Concat);
}

#[test]
fn linear_interpolation_blends_equally_spaced_gaps() {
    let table = series("entityName,year,gdp\nfr,0,2\nfr,1,\nfr,2,\nfr,3,8");
    let filled = table
        .interpolate_column_linearly("gdp", Some("entityName"), LinearInterpolation::default())
        .unwrap();

    assert_eq!(
        filled.get_values_for("gdp").unwrap(),
        &[Value::Number(2.0), Value::Number(4.0), Value::Number(6.0), Value::Number(8.0)]
    );
    // The source keeps its gaps
    assert_eq!(table.get_values_for("gdp").unwrap()[1], Value::Invalid(ErrorValue::NaNButShouldBeNumber));
}

#[test]
fn tolerance_interpolation_borrows_from_the_closest_time() {
    let table = series("entityName,year,gdp\nfr,0,5\nfr,1,\nfr,5,\nfr,6,20");
    let filled = table.interpolate_column_with_tolerance("gdp", Some("entityName"), 1).unwrap();

    assert_eq!(
        filled.get_values_for("gdp").unwrap(),
        &[Value::Number(5.0), Value::Number(5.0), Value::Number(20.0), Value::Number(20.0)]
    );
    assert_eq!(
        filled.get_values_for("gdp-originalTime").unwrap(),
        &[Value::Number(0.0), Value::Number(0.0), Value::Number(6.0), Value::Number(6.0)]
    );
    // Times are untouched; only the borrowed source time is recorded
    assert_eq!(filled.get_values_for("year").unwrap(), table.get_values_for("year").unwrap());
}

#[test]
fn tolerance_interpolation_measures_dates_in_days() {
    let table = CoreTable::new(
        "entityName,date,v\nfr,2020-01-01,5\nfr,2020-01-02,\nfr,2020-06-01,\nfr,2020-06-02,20\nfr,2020-03-15,",
        vec![ColumnDef::new("v", ColumnTypeName::Numeric)],
    );
    assert_eq!(table.time_column().map(|column| column.slug()), Some("date"));

    let filled = table.interpolate_column_with_tolerance("v", Some("entityName"), 1).unwrap();
    assert_eq!(
        filled.get_values_for("date").unwrap(),
        &["2020-01-01", "2020-01-02", "2020-03-15", "2020-06-01", "2020-06-02"].map(Value::from)
    );
    assert_eq!(
        filled.get_values_for("v").unwrap(),
        &[
            Value::Number(5.0),
            Value::Number(5.0),
            Value::Invalid(ErrorValue::NoValueWithinTolerance),
            Value::Number(20.0),
            Value::Number(20.0),
        ]
    );
    assert_eq!(
        filled.get_values_for("v-originalTime").unwrap(),
        &["2020-01-01", "2020-01-01", "2020-03-15", "2020-06-02", "2020-06-02"].map(Value::from)
    );
}

#[test]
fn rows_without_a_time_are_not_filled() {
    let table = series("entityName,year,gdp\nfr,2000,4\nfr,,\nfr,2001,\nfr,2002,8");
    let linear = table
        .interpolate_column_linearly("gdp", Some("entityName"), LinearInterpolation::default())
        .unwrap();
    assert_eq!(
        linear.get_values_for("gdp").unwrap(),
        &[
            Value::Number(4.0),
            Value::Number(6.0),
            Value::Number(8.0),
            Value::Invalid(ErrorValue::NoValueForInterpolation),
        ]
    );

    let tolerance = table.interpolate_column_with_tolerance("gdp", None, 5).unwrap();
    // Equally distant neighbors: the later one lends
    assert_eq!(
        tolerance.get_values_for("gdp").unwrap(),
        &[
            Value::Number(4.0),
            Value::Number(8.0),
            Value::Number(8.0),
            Value::Invalid(ErrorValue::NoValueWithinTolerance),
        ]
    );
    assert_eq!(
        tolerance.get_values_for("gdp-originalTime").unwrap()[1..3],
        [Value::Number(2002.0), Value::Number(2002.0)]
    );
}

#[test]
fn tolerance_interpolation_keeps_groups_apart() {
    let table = series("entityName,year,gdp\nfr,2000,1\nde,2001,\nfr,2001,\nde,2000,7");
    let filled = table.interpolate_column_with_tolerance("gdp", Some("entityName"), 1).unwrap();

    let rows: Vec<(String, Value)> = filled
        .iter_rows()
        .map(|row| (row.value("entityName").to_string(), row.value("gdp")))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("de".to_string(), Value::Number(7.0)),
            ("de".to_string(), Value::Number(7.0)),
            ("fr".to_string(), Value::Number(1.0)),
            ("fr".to_string(), Value::Number(1.0)),
        ]
    );
}

#[test]
fn later_duplicate_rows_are_reported() {
    let table = CoreTable::new("a,b\n1,2\n1,2\n3,4", numeric(&["a", "b"]));
    assert_eq!(table.duplicate_row_indices(), vec![1]);
    assert_eq!(table.drop_duplicate_rows().num_rows(), 2);
}

#[test]
fn pipeline_explains_every_step() {
    let options = TableOptions {
        id_generator: Arc::new(SequentialIds::new()),
        ..TableOptions::default()
    };
    let gdp = CoreTable::with_options(
        "entityName,year,gdp\nfr,2000,10\nde,2000,\nit,2000,30",
        vec![
            ColumnDef::new("entityName", ColumnTypeName::EntityName),
            ColumnDef::new("year", ColumnTypeName::Year),
            ColumnDef::new("gdp", ColumnTypeName::Numeric),
        ],
        options,
    );
    let continents = CoreTable::new("entityName,continent\nfr,Europe\nde,Europe", Vec::new());

    let result = gdp
        .filter_negatives("gdp")
        .unwrap()
        .left_join(&continents, None);

    assert_eq!(result.column_slugs(), &["entityName", "year", "gdp", "continent"]);
    assert_eq!(
        result.get_values_for("continent").unwrap(),
        &[Value::from("Europe"), Value::Invalid(ErrorValue::NoMatchingValueAfterJoin)]
    );

    let pipeline = result.explain_pipeline();
    let categories: Vec<TransformType> = pipeline.iter().map(|step| step.transform_category).collect();
    assert_eq!(
        categories,
        vec![TransformType::Load, TransformType::FilterRows, TransformType::AppendColumns]
    );
    assert_eq!(pipeline[0].id, "1");
    assert_eq!(pipeline[0].parent_id, None);
    assert_eq!(pipeline[1].parent_id.as_deref(), Some("1"));
    assert_eq!(pipeline[2].parent_id.as_deref(), Some(pipeline[1].id.as_str()));
    assert_eq!(pipeline[2].num_rows, 2);
    assert!(result.root_table().ptr_eq(&gdp));
    assert!(result.dump(5).contains("AppendColumns"));
}
