use crate::byte_source::ByteSource;
use crate::column::{Cell, Table};
use crate::config::ReaderConfig;
use crate::error::{Error, Result};
use crate::index::Index;
use crate::indexer::build_index;
use crate::progress::Progress;

/// One physical file's contribution to a [`LogicalIndex`]: its own
/// independently-built [`Index`] plus the byte source it indexes against.
/// Kept as an own-index pair, rather than flattened into a single giant
/// `Index`, since nothing requires two files' bytes to be addressable by a
/// shared offset space and flattening would mean copying every byte into
/// one contiguous region up front.
pub struct FileEntry {
    pub path: String,
    pub source: ByteSource,
    pub index: Index,
}

/// A logical table spanning several physically separate files indexed with
/// identical configuration. Row numbers are global; [`LogicalIndex::locate`]
/// maps a global row back to the file and local row that holds it.
pub struct LogicalIndex {
    pub(crate) entries: Vec<FileEntry>,
    pub(crate) row_offsets: Vec<u64>,
    pub(crate) col_names: Vec<String>,
    pub(crate) id_column_name: Option<String>,
}

impl LogicalIndex {
    pub fn cols(&self) -> usize {
        self.col_names.len()
    }

    pub fn rows(&self) -> u64 {
        self.row_offsets.last().copied().unwrap_or(0)
    }

    pub fn col_names(&self) -> &[String] {
        &self.col_names
    }

    /// Whether a synthetic column carrying each row's source path was
    /// requested.
    pub fn id_column_name(&self) -> Option<&str> {
        self.id_column_name.as_deref()
    }

    /// Maps a global row number to the file that holds it and its row
    /// number within that file's own `Index`.
    pub fn locate(&self, global_row: u64) -> (&FileEntry, u64) {
        let file_idx = match self.row_offsets.binary_search(&global_row) {
            Ok(exact) => exact,
            Err(insert_at) => insert_at - 1,
        };

        let local_row = global_row - self.row_offsets[file_idx];
        (&self.entries[file_idx], local_row)
    }
}

/// Builds each file's index in parallel (one thread per file, since the
/// indexer itself may further parallelize within a single large file on
/// [`std::thread::scope`]), then checks that every file agrees on column
/// count and, unless the caller's header names were supplied explicitly,
/// on header names too.
pub fn build_logical_index(
    paths: &[String],
    config: &ReaderConfig,
    progress: Option<&Progress>,
) -> Result<LogicalIndex> {
    if paths.is_empty() {
        return Err(Error::schema_mismatch("<none>".to_string(), 0, 0));
    }

    let results: Vec<Result<(ByteSource, Index, Vec<String>)>> = std::thread::scope(|scope| {
        let handles: Vec<_> = paths
            .iter()
            .map(|path| {
                scope.spawn(move || {
                    let source = ByteSource::mmap_file(path)?;
                    let build = build_index(&source, config, progress)?;
                    Ok((source, build.index, build.col_names))
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut entries = Vec::with_capacity(paths.len());
    let mut col_names: Option<Vec<String>> = None;

    for (path, result) in paths.iter().zip(results) {
        let (source, index, names) = result?;

        match &col_names {
            None => col_names = Some(names),
            Some(expected) => {
                if index.cols() != expected.len() {
                    return Err(Error::schema_mismatch(
                        path.clone(),
                        expected.len(),
                        index.cols(),
                    ));
                }

                if config.has_header && &names != expected {
                    return Err(Error::schema_mismatch(path.clone(), expected.len(), names.len()));
                }
            }
        }

        entries.push(FileEntry {
            path: path.clone(),
            source,
            index,
        });
    }

    let mut row_offsets = Vec::with_capacity(entries.len() + 1);
    let mut running = 0u64;

    for entry in &entries {
        row_offsets.push(running);
        running += entry.index.rows();
    }
    row_offsets.push(running);

    Ok(LogicalIndex {
        entries,
        row_offsets,
        col_names: col_names.unwrap_or_default(),
        id_column_name: config.id_column_name.clone(),
    })
}

/// A logical table spanning several physically separate files, each typed
/// and materializable independently through its own [`Table`]. If
/// `config.id_column_name` is set, a synthetic character column carrying
/// each row's origin path is exposed as column `0`, ahead of the files'
/// own columns.
pub struct LogicalTable {
    tables: Vec<Table>,
    paths: Vec<String>,
    row_offsets: Vec<u64>,
    id_column_name: Option<String>,
}

impl LogicalTable {
    pub fn rows(&self) -> u64 {
        self.row_offsets.last().copied().unwrap_or(0)
    }

    pub fn cols(&self) -> usize {
        let base = self.tables.first().map(|t| t.cols()).unwrap_or(0);
        base + self.id_column_name.is_some() as usize
    }

    pub fn col_names(&self) -> Vec<String> {
        let mut names = Vec::new();

        if let Some(id) = &self.id_column_name {
            names.push(id.clone());
        }

        if let Some(table) = self.tables.first() {
            names.extend(table.col_names().map(|s| s.to_string()));
        }

        names
    }

    fn locate(&self, global_row: u64) -> (usize, u64) {
        let file_idx = match self.row_offsets.binary_search(&global_row) {
            Ok(exact) => exact,
            Err(insert_at) => insert_at - 1,
        };

        (file_idx, global_row - self.row_offsets[file_idx])
    }

    /// Reads and converts a single cell, routing to the file that holds
    /// `row` and, for the synthetic id column (if configured), returning
    /// that file's own source path instead of touching any byte source.
    pub fn get(&mut self, row: u64, col: usize) -> Cell {
        let (file_idx, local_row) = self.locate(row);
        let has_id = self.id_column_name.is_some();

        if has_id && col == 0 {
            return Cell::Character(self.paths[file_idx].clone());
        }

        let inner_col = if has_id { col - 1 } else { col };
        self.tables[file_idx].get(local_row, inner_col)
    }
}

/// Builds a [`LogicalIndex`] across `paths`, then types and wraps each
/// file's own index as a [`Table`], returning the combined
/// [`LogicalTable`]. Each file is inferred independently, matching how
/// [`build_logical_index`] already validates that every file shares the
/// same physical column count and (when a header is present) the same
/// header names.
pub fn build_logical_table(paths: &[String], config: &ReaderConfig) -> Result<LogicalTable> {
    let logical = build_logical_index(paths, config, None)?;
    let row_offsets = logical.row_offsets;
    let id_column_name = logical.id_column_name;

    let mut tables = Vec::with_capacity(logical.entries.len());
    let mut table_paths = Vec::with_capacity(logical.entries.len());

    for entry in logical.entries {
        let table = Table::new(entry.source, entry.index, logical.col_names.clone(), config)?;
        tables.push(table);
        table_paths.push(entry.path);
    }

    Ok(LogicalTable {
        tables,
        paths: table_paths,
        row_offsets,
        id_column_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> String {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "lazytab_multifile_test_{}_{}.csv",
            std::process::id(),
            contents.len()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn test_build_logical_index() {
        let a = write_temp("a,b\n1,2\n3,4\n");
        let b = write_temp("a,b\n5,6\n");

        let config = ReaderConfig::new();
        let logical = build_logical_index(&[a.clone(), b.clone()], &config, None).unwrap();

        assert_eq!(logical.rows(), 3);
        assert_eq!(logical.cols(), 2);

        let (entry, local_row) = logical.locate(2);
        assert_eq!(entry.path, b);
        assert_eq!(local_row, 0);

        std::fs::remove_file(a).ok();
        std::fs::remove_file(b).ok();
    }

    #[test]
    fn test_build_logical_table_binds_source_path_column() {
        let a = write_temp("a,b\n1,2\n3,4\n");
        let b = write_temp("a,b\n5,6\n");

        let mut config = ReaderConfig::new();
        config.id_column_name("path");

        let mut table = build_logical_table(&[a.clone(), b.clone()], &config).unwrap();

        assert_eq!(table.rows(), 3);
        assert_eq!(table.cols(), 3);
        assert_eq!(table.col_names(), vec!["path", "a", "b"]);

        assert_eq!(table.get(0, 0), Cell::Character(a.clone()));
        assert_eq!(table.get(0, 1), Cell::Integer(1));
        assert_eq!(table.get(2, 0), Cell::Character(b.clone()));
        assert_eq!(table.get(2, 1), Cell::Integer(5));

        std::fs::remove_file(a).ok();
        std::fs::remove_file(b).ok();
    }

    #[test]
    fn test_mismatched_column_count_rejected() {
        let a = write_temp("a,b\n1,2\n");
        let b = write_temp("a,b,c\n1,2,3\n");

        let config = ReaderConfig::new();
        let result = build_logical_index(&[a.clone(), b.clone()], &config, None);
        assert!(result.is_err());

        std::fs::remove_file(a).ok();
        std::fs::remove_file(b).ok();
    }
}
