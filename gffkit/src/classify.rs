//! Mapping of raw feature type strings to canonical roles.
use std::fmt;
use std::str::FromStr;

use linked_hash_map::LinkedHashMap;


/// Feature types that are accepted in the input but never become features.
const FILTERED_TYPES: [&str; 3] = ["three_prime_UTR", "five_prime_UTR", "region"];

/// Gene-role types that mark pseudogenes.
const PSEUDOGENE_TYPES: [&str; 2] = ["pseudogene", "Pseudogene"];

/// Transcript-role types that are expected to carry CDS features.
const CODING_TRANSCRIPT_TYPES: [&str; 2] = ["mRNA", "transcript"];

/// The legacy alias table.
///
/// Order matters: the position of a type in this table is its output priority when the
/// transcripts of a gene are ordered.
const DEFAULT_ALIASES: [(&str, FeatureRole); 21] = [
    ("gene", FeatureRole::Gene),
    ("pseudogene", FeatureRole::Gene),
    ("Pseudogene", FeatureRole::Gene),
    ("mRNA", FeatureRole::Transcript),
    ("tRNA", FeatureRole::Transcript),
    ("rRNA", FeatureRole::Transcript),
    ("transcript", FeatureRole::Transcript),
    ("nontranslating_transcript", FeatureRole::Transcript),
    ("ncRNA", FeatureRole::Transcript),
    ("snRNA", FeatureRole::Transcript),
    ("tRNA_pseudogene", FeatureRole::Transcript),
    ("snoRNA", FeatureRole::Transcript),
    ("scRNA", FeatureRole::Transcript),
    ("piRNA", FeatureRole::Transcript),
    ("lincRNA", FeatureRole::Transcript),
    ("asRNA", FeatureRole::Transcript),
    ("miRNA_mature", FeatureRole::Transcript),
    ("miRNA", FeatureRole::Transcript),
    ("pseudogenic_transcript", FeatureRole::Transcript),
    ("exon", FeatureRole::Exon),
    ("CDS", FeatureRole::Cds),
];

/// Canonical role of a feature in the gene model hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureRole {
    Gene,
    Transcript,
    Exon,
    Cds,
}

impl FeatureRole {

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureRole::Gene => "gene",
            FeatureRole::Transcript => "transcript",
            FeatureRole::Exon => "exon",
            FeatureRole::Cds => "cds",
        }
    }
}

impl fmt::Display for FeatureRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gene" => Ok(FeatureRole::Gene),
            "transcript" => Ok(FeatureRole::Transcript),
            "exon" => Ok(FeatureRole::Exon),
            "cds" => Ok(FeatureRole::Cds),
            other => Err(format!("unknown feature role '{}'", other)),
        }
    }
}

/// Table mapping raw feature type strings to their roles.
#[derive(Debug, Clone)]
pub struct TypeAliases {
    table: LinkedHashMap<String, FeatureRole>,
}

impl Default for TypeAliases {
    fn default() -> TypeAliases {
        let mut aliases = TypeAliases::empty();
        for &(raw, role) in DEFAULT_ALIASES.iter() {
            let _ = aliases.insert(raw, role);
        }
        aliases
    }
}

impl TypeAliases {

    /// Creates a table without any aliases.
    pub fn empty() -> TypeAliases {
        TypeAliases { table: LinkedHashMap::new() }
    }

    /// Maps the given raw type to a role.
    ///
    /// A type that is already present keeps its priority but takes the new role.
    pub fn insert<T>(&mut self, raw: T, role: FeatureRole) -> &mut Self
        where T: Into<String>
    {
        let raw = raw.into();
        if let Some(existing) = self.table.get_mut(&raw) {
            *existing = role;
        } else {
            let _ = self.table.insert(raw, role);
        }
        self
    }

    /// Parses a `RAW=ROLE` alias specification and adds it to the table.
    pub fn insert_spec(&mut self, spec: &str) -> Result<&mut Self, String> {
        let mut parts = spec.splitn(2, '=');
        match (parts.next(), parts.next()) {
            (Some(raw), Some(role)) if !raw.is_empty() => {
                let role = role.parse::<FeatureRole>()?;
                Ok(self.insert(raw, role))
            },
            _ => Err(format!("invalid type alias '{}', expected RAW=ROLE", spec)),
        }
    }

    /// Returns the role of the given raw type, if it is known.
    pub fn classify(&self, raw: &str) -> Option<FeatureRole> {
        self.table.get(raw).cloned()
    }

    /// Output priority of the given raw type; unknown types sort last.
    pub fn priority(&self, raw: &str) -> usize {
        self.table.keys()
            .position(|key| key == raw)
            .unwrap_or(::std::usize::MAX)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Whether the raw type is dropped before classification.
    pub fn is_filtered(raw: &str) -> bool {
        FILTERED_TYPES.contains(&raw)
    }

    /// Whether the raw type denotes a pseudogene.
    pub fn is_pseudogene(raw: &str) -> bool {
        PSEUDOGENE_TYPES.contains(&raw)
    }

    /// Whether the raw type denotes a protein-coding transcript.
    pub fn is_coding_transcript(raw: &str) -> bool {
        CODING_TRANSCRIPT_TYPES.contains(&raw)
    }
}
