//! Identifier repair and column rewrites applied to parsed records.
use std::collections::{HashMap, HashSet};

use crate::classify::FeatureRole;
use crate::model::CdsGrouping;
use crate::record::Record;
use crate::utils::lstrip_all;


/// How Name attributes are inferred from IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMode {
    /// Only features without a Name get one, copied from their ID.
    CopyIfMissing,
    /// Every feature with an ID has its Name replaced by the ID.
    Overwrite,
}

/// Makes feature IDs unique by suffixing repeated occurrences.
///
/// The first occurrence of an ID keeps it bare; the Nth repeat becomes `ID|N`, in file order.
/// Gene records are not renamed: repeated gene records describe the same gene and are merged
/// when the hierarchy is built, and a gene's ID takes the bare slot from any other feature
/// sharing it. With parentless CDS grouping, CDS IDs are grouping keys and stay as they are.
///
/// Returns the number of renamed records.
pub fn make_ids_unique(records: &mut [Record], grouping: CdsGrouping) -> usize {
    let gene_ids: HashSet<String> = records.iter()
        .filter(|rec| rec.role == FeatureRole::Gene)
        .filter_map(|rec| rec.id.clone())
        .collect();

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut renamed = 0;
    for rec in records.iter_mut() {
        let exempt = match (rec.role, grouping) {
            (FeatureRole::Gene, _) => true,
            (FeatureRole::Cds, CdsGrouping::Parentless) => true,
            _ => false,
        };
        if exempt {
            continue;
        }
        let raw_id = match rec.id {
            Some(ref id) => id.clone(),
            None => continue,
        };
        let count = seen.entry(raw_id.clone())
            .or_insert_with(|| if gene_ids.contains(&raw_id) { 1 } else { 0 });
        if *count > 0 {
            debug!("renaming duplicate ID '{}' at line {} to '{}|{}'",
                   raw_id, rec.line, raw_id, count);
            rec.id = Some(format!("{}|{}", raw_id, count));
            renamed += 1;
        }
        *count += 1;
    }
    renamed
}

/// Sets Name attributes from IDs. Features without an ID are left alone.
///
/// Returns the number of records whose Name changed.
pub fn infer_names(records: &mut [Record], mode: NameMode) -> usize {
    let mut changed = 0;
    for rec in records.iter_mut() {
        let id = match rec.id {
            Some(ref id) => id.clone(),
            None => continue,
        };
        let replace = match mode {
            NameMode::CopyIfMissing => rec.name.is_none(),
            NameMode::Overwrite => rec.name.as_deref() != Some(id.as_str()),
        };
        if replace {
            rec.name = Some(id);
            changed += 1;
        }
    }
    changed
}

/// Prepends a literal prefix to the ID and Name of every feature.
///
/// Parent references receive the same prefix so that the hierarchy still resolves.
pub fn add_id_prefix(records: &mut [Record], prefix: &str) {
    let prefixed = |value: &String| format!("{}{}", prefix, value);
    for rec in records.iter_mut() {
        rec.id = rec.id.as_ref().map(prefixed);
        rec.name = rec.name.as_ref().map(prefixed);
        rec.parents = rec.parents.iter().map(prefixed).collect();
    }
}

/// Removes literal prefixes from the start of every text column value.
///
/// This covers the scaffold and source columns, ID, Name, Parent references, and the values
/// of every extension attribute.
pub fn strip_prefixes<S: AsRef<str>>(records: &mut [Record], prefixes: &[S]) {
    for rec in records.iter_mut() {
        lstrip_all(&mut rec.scaffold, prefixes);
        lstrip_all(&mut rec.source, prefixes);
        if let Some(ref mut id) = rec.id {
            lstrip_all(id, prefixes);
        }
        if let Some(ref mut name) = rec.name {
            lstrip_all(name, prefixes);
        }
        for parent in rec.parents.iter_mut() {
            lstrip_all(parent, prefixes);
        }
        for (_, value) in rec.attributes.iter_mut() {
            lstrip_all(value, prefixes);
        }
    }
}

/// Removes literal prefixes from the start of Name attributes only.
pub fn strip_name_prefixes<S: AsRef<str>>(records: &mut [Record], prefixes: &[S]) {
    for rec in records.iter_mut() {
        if let Some(ref mut name) = rec.name {
            lstrip_all(name, prefixes);
        }
    }
}

/// Replaces the source column of every record.
pub fn rename_source(records: &mut [Record], source: &str) {
    for rec in records.iter_mut() {
        rec.source = source.to_owned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::TypeAliases;

    fn records(lines: &[&str]) -> Vec<Record> {
        let aliases = TypeAliases::default();
        lines.iter()
            .enumerate()
            .filter_map(|(idx, line)| Record::from_line(idx + 1, line, &aliases).unwrap())
            .collect()
    }

    fn ids(records: &[Record]) -> Vec<Option<&str>> {
        records.iter().map(|rec| rec.id()).collect()
    }

    #[test]
    fn unique_ids_in_file_order() {
        let mut recs = records(&[
            "chr1\ts\tmRNA\t1\t90\t.\t+\t.\tID=t1;Parent=g1",
            "chr1\ts\tCDS\t1\t10\t.\t+\t0\tID=c1;Parent=t1",
            "chr1\ts\tCDS\t20\t30\t.\t+\t2\tID=c1;Parent=t1",
            "chr1\ts\texon\t1\t10\t.\t+\t.\tParent=t1",
            "chr1\ts\tCDS\t40\t50\t.\t+\t1\tID=c1;Parent=t1",
        ]);
        assert_eq!(make_ids_unique(&mut recs, CdsGrouping::Parented), 2);
        assert_eq!(ids(&recs), vec![Some("t1"), Some("c1"), Some("c1|1"), None, Some("c1|2")]);

        // already unique IDs are left untouched
        assert_eq!(make_ids_unique(&mut recs, CdsGrouping::Parented), 0);
        assert_eq!(ids(&recs), vec![Some("t1"), Some("c1"), Some("c1|1"), None, Some("c1|2")]);
    }

    #[test]
    fn unique_ids_genes_exempt() {
        let mut recs = records(&[
            "chr1\ts\tmRNA\t1\t90\t.\t+\t.\tID=g1;Parent=g1",
            "chr1\ts\tgene\t1\t90\t.\t+\t.\tID=g1",
            "chr1\ts\tgene\t1\t90\t.\t+\t.\tID=g1",
        ]);
        assert_eq!(make_ids_unique(&mut recs, CdsGrouping::Parented), 1);
        assert_eq!(ids(&recs), vec![Some("g1|1"), Some("g1"), Some("g1")]);
    }

    #[test]
    fn unique_ids_parentless_cds_exempt() {
        let mut recs = records(&[
            "chr1\ts\tCDS\t1\t10\t.\t+\t0\tID=c1",
            "chr1\ts\tCDS\t20\t30\t.\t+\t2\tID=c1",
        ]);
        assert_eq!(make_ids_unique(&mut recs, CdsGrouping::Parentless), 0);
        assert_eq!(ids(&recs), vec![Some("c1"), Some("c1")]);
    }

    #[test]
    fn names_copy_if_missing() {
        let mut recs = records(&[
            "chr1\ts\tgene\t1\t90\t.\t+\t.\tID=g1;Name=abc-1",
            "chr1\ts\tgene\t100\t190\t.\t+\t.\tID=g2",
            "chr1\ts\texon\t1\t10\t.\t+\t.\tParent=t1",
        ]);
        assert_eq!(infer_names(&mut recs, NameMode::CopyIfMissing), 1);
        assert_eq!(recs[0].name(), Some("abc-1"));
        assert_eq!(recs[1].name(), Some("g2"));
        assert_eq!(recs[2].name(), None);
        assert_eq!(infer_names(&mut recs, NameMode::CopyIfMissing), 0);
    }

    #[test]
    fn names_overwrite() {
        let mut recs = records(&[
            "chr1\ts\tgene\t1\t90\t.\t+\t.\tID=g1;Name=abc-1",
            "chr1\ts\tgene\t100\t190\t.\t+\t.\tID=g2",
        ]);
        assert_eq!(infer_names(&mut recs, NameMode::Overwrite), 2);
        assert_eq!(recs[0].name(), Some("g1"));
        assert_eq!(recs[0].id(), Some("g1"));
        assert_eq!(recs[1].name(), Some("g2"));
        assert_eq!(infer_names(&mut recs, NameMode::Overwrite), 0);
    }

    #[test]
    fn prefix_after_uniqueness() {
        let mut recs = records(&[
            "chr1\ts\tgene\t1\t90\t.\t+\t.\tID=g1;Name=g1",
            "chr1\ts\tmRNA\t1\t90\t.\t+\t.\tID=t1;Parent=g1",
            "chr1\ts\tmRNA\t1\t90\t.\t+\t.\tID=t1;Parent=g1",
        ]);
        let _ = make_ids_unique(&mut recs, CdsGrouping::Parented);
        add_id_prefix(&mut recs, "SM_");
        assert_eq!(ids(&recs), vec![Some("SM_g1"), Some("SM_t1"), Some("SM_t1|1")]);
        assert_eq!(recs[0].name(), Some("SM_g1"));
        assert_eq!(recs[1].name(), None);
        assert_eq!(recs[2].parents(), &["SM_g1".to_owned()]);
    }

    #[test]
    fn strip_all_columns() {
        let mut recs = records(&[
            "WBPS:chr1\tWBPS:src\tmRNA\t1\t90\t.\t+\t.\tID=WBPS:t1;Name=WBPS:T;Parent=WBPS:g1;x=WBPS:y",
        ]);
        strip_prefixes(&mut recs, &["WBPS:"]);
        assert_eq!(recs[0].to_line("mRNA", true),
                   "chr1\tsrc\tmRNA\t1\t90\t.\t+\t.\tID=t1;Name=T;Parent=g1;x=y");
    }

    #[test]
    fn strip_names_only() {
        let mut recs = records(&["chr1\ts\tgene\t1\t90\t.\t+\t.\tID=Sm_g1;Name=Sm_g1"]);
        strip_name_prefixes(&mut recs, &["Sm_"]);
        assert_eq!(recs[0].id(), Some("Sm_g1"));
        assert_eq!(recs[0].name(), Some("g1"));
    }
}
