use std::io::Write;

use lazytab::{
    build_logical_table, cell_row_to_byte_record, read_bytes, write_chunked, ByteRecord, Cell,
    ColSelect, ColumnRef, ColumnType, ColumnTypeOverride, FixedWidthLayout, ReaderConfig,
    WriterConfig, Writer,
};

fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("lazytab_it_{}_{}", std::process::id(), name));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn autoguess_delimiter() {
    let config = ReaderConfig::new();
    let mut table = read_bytes(b"a,b,c\n1,2,3\n4,5,6\n".to_vec(), &config).unwrap();

    assert_eq!(table.col_names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    assert_eq!(table.col_type(0), ColumnType::Integer);
    assert_eq!(table.get(0, 0), Cell::Integer(1));
    assert_eq!(table.get(0, 1), Cell::Integer(2));
    assert_eq!(table.get(1, 2), Cell::Integer(6));
}

#[test]
fn quoted_newline_embedded_in_field() {
    let config = ReaderConfig::new();
    let mut table = read_bytes(b"x,y\n\"a\nb\",1\nc,2\n".to_vec(), &config).unwrap();

    assert_eq!(table.rows(), 2);
    assert_eq!(table.get(0, 0), Cell::Character("a\nb".to_string()));
    assert_eq!(table.get(1, 0), Cell::Character("c".to_string()));
}

#[test]
fn column_select_with_rename() {
    let mut config = ReaderConfig::new();
    config.col_select(ColSelect::Named(vec![
        ("car".to_string(), ColumnRef::Position(0)),
        ("".to_string(), ColumnRef::Position(2)),
    ]));

    let input = b"model,mpg,cyl,disp\nMazda,21,6,160\nDatsun,22,4,108\n".to_vec();
    let mut table = read_bytes(input, &config).unwrap();

    assert_eq!(table.cols(), 2);
    assert_eq!(table.col_names().collect::<Vec<_>>(), vec!["car", "cyl"]);
    assert_eq!(table.get(0, 0), Cell::Character("Mazda".to_string()));
    assert_eq!(table.get(0, 1), Cell::Integer(6));
}

#[test]
fn multi_file_with_source_path_column() {
    let a = write_temp("a.csv", "a,b\n1,2\n");
    let b = write_temp("b.csv", "a,b\n3,4\n");

    let mut config = ReaderConfig::new();
    config.id_column_name("path");

    let paths = vec![
        a.to_string_lossy().to_string(),
        b.to_string_lossy().to_string(),
    ];
    let mut table = build_logical_table(&paths, &config).unwrap();

    assert_eq!(table.rows(), 2);
    assert_eq!(table.cols(), 3);
    assert_eq!(table.col_names(), vec!["path", "a", "b"]);
    assert_eq!(table.get(0, 0), Cell::Character(a.to_string_lossy().to_string()));
    assert_eq!(table.get(1, 0), Cell::Character(b.to_string_lossy().to_string()));
    assert_eq!(table.get(1, 1), Cell::Integer(3));

    std::fs::remove_file(a).ok();
    std::fs::remove_file(b).ok();
}

#[test]
fn type_override_and_skip() {
    let mut config = ReaderConfig::new();
    config.col_type("hp", ColumnTypeOverride::Integer);
    config.col_type("cyl", ColumnTypeOverride::Skip);
    config.col_type("gear", ColumnTypeOverride::Factor);

    let input = b"hp,cyl,gear\n110,6,4\n93,4,3\n".to_vec();
    let table = read_bytes(input, &config).unwrap();

    assert!(table.col_index("cyl").is_none());
    assert_eq!(table.col_type(table.col_index("hp").unwrap()), ColumnType::Integer);
    assert_eq!(table.col_type(table.col_index("gear").unwrap()), ColumnType::Factor);
}

#[test]
fn fixed_width_by_widths() {
    let path = write_temp("fixed.txt", "john      NYC       123-45-6789\n");
    let layout = FixedWidthLayout::Widths(vec![10, 10, 12]);

    let (source, index) = lazytab::read_fixed_width(&path, &layout, false).unwrap();
    assert_eq!(index.rows(), 1);
    assert_eq!(index.cols(), 3);

    let data = source.as_slice();
    let cells: Vec<String> = (0..3)
        .map(|c| {
            let (lo, hi) = index.field_bounds(0, c);
            String::from_utf8_lossy(&data[lo as usize..hi as usize]).trim().to_string()
        })
        .collect();

    assert_eq!(cells, vec!["john", "NYC", "123-45-6789"]);
    std::fs::remove_file(path).ok();
}

#[test]
fn read_then_write_round_trips_values() {
    let config = ReaderConfig::new();
    let input = b"id,name,score\n1,alice,9.5\n2,bob,NA\n".to_vec();
    let mut table = read_bytes(input, &config).unwrap();

    let rows: Vec<Vec<Cell>> = (0..table.rows())
        .map(|r| (0..table.cols()).map(|c| table.get(r, c)).collect())
        .collect();

    let mut out: Vec<u8> = Vec::new();
    {
        let mut writer = lazytab::Writer::with_capacity(&mut out, 4096, b',', b'"');
        for row in &rows {
            let record = cell_row_to_byte_record(row, "NA");
            writer.write_byte_record(&record).unwrap();
        }
        writer.flush().unwrap();
    }

    let mut roundtrip = read_bytes(out, &config).unwrap();
    assert_eq!(roundtrip.rows(), 2);
    assert_eq!(roundtrip.get(0, 1), Cell::Character("alice".to_string()));
    assert_eq!(roundtrip.get(1, 2), Cell::Na);
}

#[test]
fn write_chunked_matches_sequential_writer_output() {
    let rows: Vec<ByteRecord> = (0..500)
        .map(|i: i32| {
            vec![i.to_string(), (i * 2).to_string()]
                .into_iter()
                .collect::<ByteRecord>()
        })
        .collect();

    let mut config = WriterConfig::new();
    config.chunk_rows(37);

    let chunked_out = write_chunked(Vec::new(), &config, None, &rows).unwrap();

    let mut sequential_writer = Writer::from_config(Vec::new(), &config);
    for row in &rows {
        sequential_writer.write_byte_record(row).unwrap();
    }
    let sequential = sequential_writer.into_inner().unwrap();

    assert_eq!(chunked_out, sequential);
}

#[test]
fn differential_against_csv_crate() {
    let input = "a,b,c\n1,hello,2.5\n2,\"quoted, value\",3.5\n";

    let mut lazytab_rows: Vec<Vec<String>> = Vec::new();
    {
        let config = ReaderConfig::new();
        let mut table = read_bytes(input.as_bytes().to_vec(), &config).unwrap();
        for r in 0..table.rows() {
            let row: Vec<String> = (0..table.cols())
                .map(|c| match table.get(r, c) {
                    Cell::Integer(n) => n.to_string(),
                    Cell::Double(n) => n.to_string(),
                    Cell::Character(s) => s,
                    Cell::Na => String::new(),
                    other => format!("{:?}", other),
                })
                .collect();
            lazytab_rows.push(row);
        }
    }

    let mut csv_rows: Vec<Vec<String>> = Vec::new();
    let mut reader = csv::ReaderBuilder::new().from_reader(input.as_bytes());
    for record in reader.records() {
        let record = record.unwrap();
        csv_rows.push(record.iter().map(|f| f.to_string()).collect());
    }

    assert_eq!(lazytab_rows, csv_rows);
}

#[test]
fn read_reports_column_count_mismatch_as_problem_not_error() {
    let config = ReaderConfig::new();
    let table = read_bytes(b"a,b,c\n1,2\n3,4,5\n".to_vec(), &config).unwrap();

    assert_eq!(table.rows(), 2);
    assert!(!table.problems().is_empty());
}
