/*! Scaffold name remapping.

The synonym table is a headerless, tab-separated file with four columns per scaffold. The third
column holds the alternate (INSDC) name found in annotation files and the second column the
canonical (community) name it is replaced with.
*/
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};

use crate::record::Record;
use crate::Error;


/// Suffix of synonym table files looked up in a directory.
const SYNONYMS_FILE_SUFFIX: &str = "seq_region_synonyms.tsv";

/// Number of columns of a synonym table row.
const NUM_COLUMNS: usize = 4;

/// Column holding the canonical name.
const CANONICAL_COLUMN: usize = 1;

/// Column holding the alternate name used as the lookup key.
const ALTERNATE_COLUMN: usize = 2;

/// Mapping from alternate scaffold names to canonical ones.
#[derive(Debug, Clone, Default)]
pub struct Synonyms {
    map: HashMap<String, String>,
}

impl Synonyms {

    pub fn new() -> Synonyms {
        Synonyms::default()
    }

    /// Reads a synonym table.
    pub fn from_reader<R: io::Read>(reader: R) -> crate::Result<Synonyms> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(reader);

        let mut synonyms = Synonyms::new();
        for result in rdr.records() {
            let row = result?;
            if row.len() != NUM_COLUMNS {
                return Err(malformed_row(&row));
            }
            let _ = synonyms.insert(&row[ALTERNATE_COLUMN], &row[CANONICAL_COLUMN]);
        }
        Ok(synonyms)
    }

    /// Reads a synonym table from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Synonyms> {
        let file = fs::File::open(path)?;
        Synonyms::from_reader(io::BufReader::new(file))
    }

    /// Finds the single `*seq_region_synonyms.tsv` file in the given directory.
    pub fn find_in_dir<P: AsRef<Path>>(dir: P) -> crate::Result<PathBuf> {
        let mut found = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let matches = path.file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| name.ends_with(SYNONYMS_FILE_SUFFIX));
            if matches && path.is_file() {
                found.push(path);
            }
        }
        match found.len() {
            1 => Ok(found.remove(0)),
            n => Err(Error::SynonymsFileNotFound(n)),
        }
    }

    /// Finds the single synonym table in the current working directory.
    pub fn find_in_current_dir() -> crate::Result<PathBuf> {
        Synonyms::find_in_dir(env::current_dir()?)
    }

    /// Adds a mapping, returning the canonical name previously stored for the alternate name.
    pub fn insert<A, C>(&mut self, alternate: A, canonical: C) -> Option<String>
        where A: Into<String>, C: Into<String>
    {
        self.map.insert(alternate.into(), canonical.into())
    }

    /// Canonical name for the given alternate name.
    pub fn get(&self, alternate: &str) -> Option<&str> {
        self.map.get(alternate).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Rewrites the scaffold of every record to its canonical name.
    ///
    /// The first record, in order, whose scaffold has no entry fails the whole remap with
    /// `UnmappedScaffold`; no record is changed in that case.
    pub fn remap(&self, records: &mut [Record]) -> crate::Result<()> {
        if let Some(rec) = records.iter().find(|rec| self.get(rec.scaffold()).is_none()) {
            return Err(Error::UnmappedScaffold(rec.scaffold().to_owned()));
        }
        for rec in records.iter_mut() {
            if let Some(canonical) = self.map.get(rec.scaffold.as_str()) {
                rec.scaffold = canonical.clone();
            }
        }
        Ok(())
    }
}

fn malformed_row(row: &StringRecord) -> Error {
    Error::MalformedSynonyms {
        line: row.position().map_or(0, |pos| pos.line() as usize),
        raw: row.iter().collect::<Vec<_>>().join("\t"),
    }
}
