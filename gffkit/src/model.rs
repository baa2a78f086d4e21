/*! Gene model hierarchy.

[`AnnotationModel`] links classified records into a gene → transcript → {exon, CDS} tree. Records
may arrive in any order: a transcript can precede its gene, and exons or CDS segments can precede
their transcript. Genes that are only referenced as a parent start out as placeholders and are
materialized when their own record shows up.

Once every record is added, [`AnnotationModel::finalize`] resolves the pending children, applies
the pseudogene repair, and orders the transcripts of each gene. A finalized model accepts no
further records.
*/
use std::cmp::{max, min};
use std::mem;

use linked_hash_map::LinkedHashMap;
use multimap::MultiMap;

use crate::classify::{FeatureRole, TypeAliases};
use crate::consts::{DEF_ID, GENE_STR, MRNA_STR, PSEUDOGENIC_TRANSCRIPT_STR,
                    SYNTH_CDS_SUFFIX, SYNTH_GENE_SUFFIX};
use crate::record::{Attributes, Record, RecordBuilder};
use crate::Error;


/// Number of CDS segments that may share one ID when CDS are grouped by ID.
const MAX_PARENTLESS_CDS_SEGMENTS: usize = 2;

/// How CDS segments are grouped into transcripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdsGrouping {
    /// CDS segments belong to the transcript named by their Parent attribute.
    Parented,
    /// CDS segments are grouped by their own ID, each group making one synthesized transcript.
    Parentless,
}

impl Default for CdsGrouping {
    fn default() -> CdsGrouping {
        CdsGrouping::Parented
    }
}

/// Lifecycle of a gene or transcript in the model.
///
/// A key that was never seen has no entry at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureState {
    /// Referenced as a parent, own record not yet parsed.
    Placeholder,
    /// Own record parsed.
    Materialized,
    /// Pseudogene repair applied and children ordered.
    Finalized,
}

macro_rules! impl_common {
    ($struct_ty:ty) => (

        impl $struct_ty {

            /// Key of the feature in the model.
            pub fn id(&self) -> &str {
                self.key.as_str()
            }

            pub fn state(&self) -> FeatureState {
                self.state
            }

            pub fn is_finalized(&self) -> bool {
                self.state == FeatureState::Finalized
            }
        }

    );
}

#[derive(Debug, Clone)]
pub struct Gene {
    key: String,
    pub(crate) record: Option<Record>,
    pub(crate) transcripts: Vec<String>,
    state: FeatureState,
}

impl_common!(Gene);

impl Gene {

    fn placeholder(key: String) -> Gene {
        Gene {
            key,
            record: None,
            transcripts: Vec::new(),
            state: FeatureState::Placeholder,
        }
    }

    /// The gene record; `None` while the gene is a placeholder.
    pub fn record(&self) -> Option<&Record> {
        self.record.as_ref()
    }

    /// IDs of the gene's transcripts, in output order once finalized.
    pub fn transcript_ids(&self) -> &[String] {
        self.transcripts.as_slice()
    }

    pub fn scaffold(&self) -> Option<&str> {
        self.record.as_ref().map(|rec| rec.scaffold())
    }

    pub fn is_pseudogene(&self) -> bool {
        self.record.as_ref()
            .map_or(false, |rec| TypeAliases::is_pseudogene(rec.feature_type()))
    }
}

#[derive(Debug, Clone)]
pub struct Transcript {
    key: String,
    pub(crate) record: Record,
    pub(crate) gene_id: String,
    pub(crate) exons: Vec<Record>,
    pub(crate) cds: Vec<Record>,
    pub(crate) type_override: Option<&'static str>,
    order: usize,
    state: FeatureState,
}

impl_common!(Transcript);

impl Transcript {

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Key of the gene that owns the transcript.
    pub fn gene_id(&self) -> &str {
        self.gene_id.as_str()
    }

    pub fn exons(&self) -> &[Record] {
        self.exons.as_slice()
    }

    pub fn cds(&self) -> &[Record] {
        self.cds.as_slice()
    }

    pub fn scaffold(&self) -> &str {
        self.record.scaffold()
    }

    /// Feature type written for the transcript.
    ///
    /// This is the parsed type unless a repair (pseudogene propagation, data check fixes)
    /// replaced it.
    pub fn output_type(&self) -> &str {
        self.type_override.unwrap_or_else(|| self.record.feature_type())
    }
}

/// The in-memory gene model of one annotation file.
#[derive(Debug, Clone)]
pub struct AnnotationModel {
    pub(crate) genes: LinkedHashMap<String, Gene>,
    pub(crate) transcripts: LinkedHashMap<String, Transcript>,
    pub(crate) pending_exons: MultiMap<String, Record>,
    pub(crate) pending_cds: MultiMap<String, Record>,
    pub(crate) parentless_cds: LinkedHashMap<String, Vec<Record>>,
    grouping: CdsGrouping,
    aliases: TypeAliases,
    next_order: usize,
    finalized: bool,
}

impl Default for AnnotationModel {
    fn default() -> AnnotationModel {
        AnnotationModel::new(CdsGrouping::default())
    }
}

impl AnnotationModel {

    /// Creates an empty model using the default type alias table.
    pub fn new(grouping: CdsGrouping) -> AnnotationModel {
        AnnotationModel::with_aliases(grouping, TypeAliases::default())
    }

    /// Creates an empty model; the alias table sets the output order of transcript types.
    pub fn with_aliases(grouping: CdsGrouping, aliases: TypeAliases) -> AnnotationModel {
        AnnotationModel {
            genes: LinkedHashMap::new(),
            transcripts: LinkedHashMap::new(),
            pending_exons: MultiMap::new(),
            pending_cds: MultiMap::new(),
            parentless_cds: LinkedHashMap::new(),
            grouping,
            aliases,
            next_order: 0,
            finalized: false,
        }
    }

    /// Builds and finalizes a model from records in file order.
    pub fn from_records<I>(records: I, grouping: CdsGrouping) -> crate::Result<AnnotationModel>
        where I: IntoIterator<Item=Record>
    {
        let mut model = AnnotationModel::new(grouping);
        model.extend(records)?;
        model.finalize()?;
        Ok(model)
    }

    pub fn grouping(&self) -> CdsGrouping {
        self.grouping
    }

    pub fn aliases(&self) -> &TypeAliases {
        &self.aliases
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Genes in the order their keys were first seen.
    pub fn genes(&self) -> impl Iterator<Item=&Gene> {
        self.genes.values()
    }

    pub fn gene(&self, id: &str) -> Option<&Gene> {
        self.genes.get(id)
    }

    pub fn transcripts(&self) -> impl Iterator<Item=&Transcript> {
        self.transcripts.values()
    }

    pub fn transcript(&self, id: &str) -> Option<&Transcript> {
        self.transcripts.get(id)
    }

    /// Transcripts of the given gene, in the gene's child order.
    pub fn gene_transcripts<'a>(&'a self, gene: &'a Gene) -> impl Iterator<Item=&'a Transcript> {
        gene.transcripts.iter().filter_map(move |tid| self.transcripts.get(tid))
    }

    pub fn num_genes(&self) -> usize {
        self.genes.len()
    }

    pub fn num_transcripts(&self) -> usize {
        self.transcripts.len()
    }

    /// Total number of records the model writes.
    pub fn num_records(&self) -> usize {
        self.genes.len() + self.transcripts.values()
            .map(|trx| 1 + trx.exons.len() + trx.cds.len())
            .fold(0, |acc, x| acc + x)
    }

    /// Adds records in file order.
    pub fn extend<I>(&mut self, records: I) -> crate::Result<()>
        where I: IntoIterator<Item=Record>
    {
        for record in records {
            self.add(record)?;
        }
        Ok(())
    }

    /// Adds one classified record to the hierarchy.
    pub fn add(&mut self, record: Record) -> crate::Result<()> {
        if self.finalized {
            return Err(Error::ModelFinalized);
        }
        match record.role() {
            FeatureRole::Gene => self.add_gene(record),
            FeatureRole::Transcript => self.add_transcript(record),
            FeatureRole::Exon => self.add_exon(record),
            FeatureRole::Cds => self.add_cds(record),
        }
    }

    pub(crate) fn add_gene(&mut self, record: Record) -> crate::Result<()> {
        let key = record.key()
            .map(|k| k.to_owned())
            .ok_or_else(|| Error::MissingGeneIdentity {
                line: record.line(),
                raw: record.raw().to_owned(),
            })?;

        if !self.genes.contains_key(&key) {
            let mut gene = Gene::placeholder(key.clone());
            gene.record = Some(record);
            gene.state = FeatureState::Materialized;
            let _ = self.genes.insert(key, gene);
            return Ok(());
        }

        if let Some(gene) = self.genes.get_mut(&key) {
            let line = record.line();
            if gene.record.is_none() {
                debug!("materializing gene '{}' from line {}", key, line);
                gene.record = Some(record);
                gene.state = FeatureState::Materialized;
            } else if let Some(existing) = gene.record.as_mut() {
                if existing.update_from(record) {
                    warn!("duplicate gene definition '{}' at line {}, attributes from the \
                           earlier record at line {} are overwritten",
                          key, line, existing.line());
                } else {
                    debug!("repeated gene record '{}' at line {}", key, line);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn add_transcript(&mut self, mut record: Record) -> crate::Result<()> {
        let tid = record.id()
            .map(|id| id.to_owned())
            .ok_or_else(|| Error::MissingTranscriptId {
                line: record.line(),
                raw: record.raw().to_owned(),
            })?;

        let gene_id = match (record.parents.len(), self.grouping) {
            (0, CdsGrouping::Parented) => {
                return Err(Error::MissingParent {
                    line: record.line(),
                    raw: record.raw().to_owned(),
                    feature_type: record.feature_type().to_owned(),
                });
            },
            (0, CdsGrouping::Parentless) => {
                let gid = format!("{}{}", tid, SYNTH_GENE_SUFFIX);
                record.parents = vec![gid.clone()];
                gid
            },
            (1, _) => record.parents[0].clone(),
            (n, _) => {
                warn!("transcript '{}' at line {} has {} parents, using '{}'",
                      tid, record.line(), n, record.parents[0]);
                record.parents.truncate(1);
                record.parents[0].clone()
            },
        };

        if let Some(previous) = self.transcripts.remove(&tid) {
            warn!("duplicate transcript '{}' at line {} replaces the record from line {}",
                  tid, record.line(), previous.record.line());
            self.detach_transcript(&previous.gene_id, &tid);
        }

        self.register_child(&gene_id, &tid);
        let order = self.next_order;
        self.next_order += 1;
        let _ = self.transcripts.insert(tid.clone(), Transcript {
            key: tid,
            record,
            gene_id,
            exons: Vec::new(),
            cds: Vec::new(),
            type_override: None,
            order,
            state: FeatureState::Materialized,
        });
        Ok(())
    }

    fn add_exon(&mut self, record: Record) -> crate::Result<()> {
        let owner = owner_of(&record)?;
        self.pending_exons.insert(owner, record);
        Ok(())
    }

    fn add_cds(&mut self, record: Record) -> crate::Result<()> {
        match self.grouping {
            CdsGrouping::Parented => {
                let owner = owner_of(&record)?;
                self.pending_cds.insert(owner, record);
            },
            CdsGrouping::Parentless => {
                let cid = record.id()
                    .map(|id| id.to_owned())
                    .ok_or_else(|| Error::MissingFeatureId {
                        line: record.line(),
                        raw: record.raw().to_owned(),
                        feature_type: record.feature_type().to_owned(),
                    })?;
                self.parentless_cds.entry(cid).or_insert_with(Vec::new).push(record);
            },
        }
        Ok(())
    }

    /// Registers a transcript as a child of a gene, creating a placeholder gene if needed.
    pub(crate) fn register_child(&mut self, gene_id: &str, tid: &str) {
        if !self.genes.contains_key(gene_id) {
            debug!("gene '{}' referenced before its own record", gene_id);
            let _ = self.genes.insert(gene_id.to_owned(), Gene::placeholder(gene_id.to_owned()));
        }
        if let Some(gene) = self.genes.get_mut(gene_id) {
            if !gene.transcripts.iter().any(|t| t == tid) {
                gene.transcripts.push(tid.to_owned());
            }
        }
    }

    /// Removes a transcript from a gene's child list.
    ///
    /// A placeholder gene left without children is dropped.
    pub(crate) fn detach_transcript(&mut self, gene_id: &str, tid: &str) {
        let drop_gene = match self.genes.get_mut(gene_id) {
            Some(gene) => {
                gene.transcripts.retain(|t| t != tid);
                gene.record.is_none() && gene.transcripts.is_empty()
            },
            None => false,
        };
        if drop_gene {
            let _ = self.genes.remove(gene_id);
        }
    }

    /// Resolves every pending reference and orders the hierarchy.
    ///
    /// Calling this on a finalized model does nothing.
    pub fn finalize(&mut self) -> crate::Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.resolve_parentless_cds()?;
        self.attach_children()?;
        self.materialize_placeholders()?;
        self.propagate_pseudogenes();
        self.order_transcripts();
        for (_, trx) in self.transcripts.iter_mut() {
            trx.state = FeatureState::Finalized;
        }
        self.finalized = true;
        info!("built {} gene(s) with {} transcript(s)", self.genes.len(), self.transcripts.len());
        Ok(())
    }

    /// Turns each group of CDS segments sharing an ID into one synthesized mRNA.
    fn resolve_parentless_cds(&mut self) -> crate::Result<()> {
        let groups = mem::replace(&mut self.parentless_cds, LinkedHashMap::new());
        for (cid, mut segments) in groups {
            if segments.len() > MAX_PARENTLESS_CDS_SEGMENTS {
                return Err(Error::MultipleCdsSegments { id: cid, count: segments.len() });
            }
            let (start, end) = segments.iter()
                .fold((::std::u64::MAX, ::std::u64::MIN),
                      |acc, seg| (min(acc.0, seg.start()), max(acc.1, seg.end())));

            let transcript = {
                let first = &segments[0];
                let mut builder = RecordBuilder::from_template(first, MRNA_STR,
                                                               FeatureRole::Transcript)
                    .coords(start, end)
                    .attributes(Attributes::new())
                    .id(cid.as_str());
                if let Some(name) = first.name() {
                    builder = builder.name(name);
                }
                if let Some(parent) = first.owner() {
                    builder = builder.parent(parent);
                }
                builder.build()?
            };
            debug!("synthesizing mRNA '{}' from {} CDS segment(s)", cid, segments.len());
            self.add_transcript(transcript)?;

            let cds_id = format!("{}{}", cid, SYNTH_CDS_SUFFIX);
            for mut seg in segments.drain(..) {
                seg.id = Some(cds_id.clone());
                seg.parents = vec![cid.clone()];
                self.pending_cds.insert(cid.clone(), seg);
            }
        }
        Ok(())
    }

    /// Moves pending exons and CDS segments into their transcripts.
    fn attach_children(&mut self) -> crate::Result<()> {
        for (tid, trx) in self.transcripts.iter_mut() {
            if let Some(exons) = self.pending_exons.remove(tid) {
                trx.exons.extend(exons);
            }
            if let Some(cds) = self.pending_cds.remove(tid) {
                trx.cds.extend(cds);
            }
        }

        let orphan = self.pending_exons.iter_all()
            .chain(self.pending_cds.iter_all())
            .flat_map(|(parent, recs)| recs.iter().map(move |rec| (parent, rec)))
            .min_by_key(|&(_, rec)| rec.line());
        match orphan {
            Some((parent, rec)) => Err(Error::UnknownParent {
                line: rec.line(),
                id: rec.id().unwrap_or(DEF_ID).to_owned(),
                parent: parent.clone(),
                expected: "transcript",
            }),
            None => Ok(()),
        }
    }

    /// Synthesizes the record of every gene that was only referenced as a parent.
    fn materialize_placeholders(&mut self) -> crate::Result<()> {
        let transcripts = &self.transcripts;
        let mut empty = Vec::new();
        for (_, gene) in self.genes.iter_mut().filter(|(_, gene)| gene.record.is_none()) {
            let children: Vec<&Record> = gene.transcripts.iter()
                .filter_map(|tid| transcripts.get(tid))
                .map(|trx| &trx.record)
                .collect();
            let first = match children.first() {
                Some(first) => *first,
                None => {
                    empty.push(gene.key.clone());
                    continue;
                },
            };
            let (start, end) = children.iter()
                .fold((first.start(), first.end()),
                      |acc, rec| (min(acc.0, rec.start()), max(acc.1, rec.end())));
            warn!("gene '{}' is only referenced as a parent, synthesizing it from {} \
                   transcript(s)", gene.key, children.len());
            let record = RecordBuilder::from_template(first, GENE_STR, FeatureRole::Gene)
                .coords(start, end)
                .attributes(Attributes::new())
                .id(gene.key.as_str())
                .build()?;
            gene.record = Some(record);
            gene.state = FeatureState::Materialized;
        }
        for key in empty {
            let _ = self.genes.remove(&key);
        }
        Ok(())
    }

    /// Retypes every transcript of a pseudogene as `pseudogenic_transcript`.
    fn propagate_pseudogenes(&mut self) {
        let transcripts = &mut self.transcripts;
        for gene in self.genes.values().filter(|gene| gene.is_pseudogene()) {
            for tid in gene.transcripts.iter() {
                if let Some(trx) = transcripts.get_mut(tid) {
                    trx.type_override = Some(PSEUDOGENIC_TRANSCRIPT_STR);
                }
            }
        }
    }

    /// Orders the transcripts of each gene by type priority, then by insertion order.
    fn order_transcripts(&mut self) {
        let transcripts = &self.transcripts;
        let aliases = &self.aliases;
        for (_, gene) in self.genes.iter_mut() {
            gene.transcripts.sort_by_key(|tid| {
                transcripts.get(tid)
                    .map(|trx| (aliases.priority(trx.record.feature_type()), trx.order))
                    .unwrap_or((::std::usize::MAX, ::std::usize::MAX))
            });
            gene.state = FeatureState::Finalized;
        }
    }

    /// Removes a gene together with its transcripts.
    pub(crate) fn remove_gene(&mut self, gene_id: &str) -> Option<(Gene, Vec<Transcript>)> {
        let gene = self.genes.remove(gene_id)?;
        let transcripts = gene.transcripts.iter()
            .filter_map(|tid| self.transcripts.remove(tid))
            .collect();
        Some((gene, transcripts))
    }

    /// Inserts a gene together with its transcripts, as removed from another model.
    pub(crate) fn insert_gene(&mut self, gene: Gene, transcripts: Vec<Transcript>) {
        for trx in transcripts {
            let _ = self.transcripts.insert(trx.key.clone(), trx);
        }
        let _ = self.genes.insert(gene.key.clone(), gene);
    }

    /// Creates an empty, finalized model sharing this model's settings.
    pub(crate) fn empty_like(&self) -> AnnotationModel {
        let mut model = AnnotationModel::with_aliases(self.grouping, self.aliases.clone());
        model.finalized = self.finalized;
        model
    }
}

/// The Parent reference owning an exon or CDS record.
fn owner_of(record: &Record) -> crate::Result<String> {
    record.owner()
        .map(|p| p.to_owned())
        .ok_or_else(|| Error::MissingParent {
            line: record.line(),
            raw: record.raw().to_owned(),
            feature_type: record.feature_type().to_owned(),
        })
}
