use std::path::PathBuf;

use clap::{App, Arg, ArgMatches, SubCommand};
use gffkit::{AttributeFilter, CdsGrouping, CheckMode, DataChecks, Extrapolation, NameMode,
             ParseMode, ReformatOptions, SortOrder, TypeAliases, DEFAULT_SOURCE};

use crate::tools::TEMPLATE_SUBCMD;
use crate::Error;

pub const NAME: &str = "reformat";


pub fn build_cli<'a, 'b>() -> App<'a, 'b> {
    SubCommand::with_name(NAME)
        .about("Reconciles a GFF3 annotation into canonically ordered gene models")
        .template(TEMPLATE_SUBCMD)
        .arg(Arg::with_name("input_gff")
                .value_name("input_gff")
                .help("Path to input annotation file or '-' for stdin")
                .takes_value(true)
                .required(true))
        .arg(Arg::with_name("output_gff")
                .value_name("output_gff")
                .help("Path to output annotation file or '-' for stdout")
                .takes_value(true)
                .required(true))
        .arg(Arg::with_name("keep_source")
                .long("keep_source")
                .help("Leave the source column unchanged instead of setting it to \
                       WormBase_imported"))
        .arg(Arg::with_name("keep_scaffold_names")
                .long("keep_scaffold_names")
                .help("Leave scaffold names unchanged instead of renaming them through the \
                       synonyms file"))
        .arg(Arg::with_name("no_parentage")
                .long("no_parentage")
                .help("Input has no parentage; CDS segments are grouped by their own ID"))
        .arg(Arg::with_name("gene_prefix")
                .short("g")
                .long("gene_prefix")
                .value_name("prefix")
                .help("Prefix added to every ID and Name")
                .takes_value(true))
        .arg(Arg::with_name("prefixes")
                .short("p")
                .long("prefixes")
                .value_name("prefix")
                .help("Prefixes removed from every column value")
                .takes_value(true)
                .multiple(true)
                .min_values(1)
                .use_delimiter(true))
        .arg(Arg::with_name("name_prefixes")
                .long("name_prefixes")
                .value_name("prefix")
                .help("Prefixes removed from Name attributes")
                .takes_value(true)
                .multiple(true)
                .min_values(1)
                .use_delimiter(true))
        .arg(Arg::with_name("fabricate_transcripts_for_scaffold")
                .short("T")
                .long("fabricate_transcripts_for_scaffold")
                .visible_alias("extrapolate_transcripts_for_scaffold")
                .value_name("scaffold")
                .help("Create transcripts and exons from the genes and CDS of a scaffold")
                .takes_value(true)
                .conflicts_with("extrapolate_genes_for_scaffold"))
        .arg(Arg::with_name("extrapolate_genes_for_scaffold")
                .short("G")
                .long("extrapolate_genes_for_scaffold")
                .value_name("scaffold")
                .help("Create genes from the transcripts of a scaffold")
                .takes_value(true))
        .arg(Arg::with_name("extrapolate_exons_for_scaffold")
                .short("E")
                .long("extrapolate_exons_for_scaffold")
                .value_name("scaffold")
                .help("Create exons from the CDS of a scaffold")
                .takes_value(true)
                .conflicts_with_all(&["fabricate_transcripts_for_scaffold",
                                      "extrapolate_CDSs_for_scaffold"]))
        .arg(Arg::with_name("extrapolate_CDSs_for_scaffold")
                .short("C")
                .long("extrapolate_CDSs_for_scaffold")
                .value_name("scaffold")
                .help("Create CDS from the exons of a scaffold")
                .takes_value(true)
                .conflicts_with("fabricate_transcripts_for_scaffold"))
        .arg(Arg::with_name("infer_gene_names")
                .short("n")
                .long("infer_gene_names")
                .help("Copy IDs into the Name of features without one")
                .conflicts_with("overwrite_gene_names"))
        .arg(Arg::with_name("overwrite_gene_names")
                .short("N")
                .long("overwrite_gene_names")
                .help("Copy IDs into the Name of every feature"))
        .arg(Arg::with_name("fasta")
                .short("f")
                .long("fasta")
                .value_name("path")
                .help("Assembly FASTA; defaults to the *.fa file in the working directory")
                .takes_value(true))
        .arg(Arg::with_name("synonyms_file")
                .long("synonyms_file")
                .value_name("path")
                .help("Scaffold synonyms table; defaults to the *seq_region_synonyms.tsv file \
                       in the working directory")
                .takes_value(true))
        .arg(Arg::with_name("lenient")
                .long("lenient")
                .help("Drop malformed records and unknown feature types instead of failing"))
        .arg(Arg::with_name("type_alias")
                .long("type_alias")
                .value_name("RAW=ROLE")
                .help("Treat feature type RAW as gene, transcript, exon, or cds")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1))
        .arg(Arg::with_name("natural_sort")
                .long("natural_sort")
                .help("Sort genes with numbers compared by value (gene2 before gene10)"))
        .arg(Arg::with_name("keep_attributes")
                .long("keep_attributes")
                .help("Write attributes other than ID, Name, and Parent"))
        .arg(Arg::with_name("split_gff_when_gene_attribute")
                .long("split_gff_when_gene_attribute")
                .value_name("key=value[;key=value]")
                .help("Move matching genes into extracted.gff3 next to the output")
                .takes_value(true))
        .arg(Arg::with_name("no_finding_lists")
                .long("no_finding_lists")
                .help("Do not write data check findings as ID lists next to the output"))
        .arg(Arg::with_name("no_gene_names_dc")
                .long("no_gene_names_dc")
                .help("Do not require a Name on every gene"))
        .arg(Arg::with_name("no_gff_fasta_scaffold_match_dc")
                .long("no_gff_fasta_scaffold_match_dc")
                .help("Do not compare the scaffolds of the output with those of the assembly"))
        .arg(Arg::with_name("no_cds_with_exons_dc")
                .long("no_cds_with_exons_dc")
                .help("Do not check that transcripts with CDS have exons")
                .conflicts_with("no_fix_cds_with_exons_dc"))
        .arg(Arg::with_name("no_fix_cds_with_exons_dc")
                .long("no_fix_cds_with_exons_dc")
                .help("Report transcripts with CDS but no exons without retyping them"))
        .arg(Arg::with_name("no_cds_within_exons_dc")
                .long("no_cds_within_exons_dc")
                .help("Do not check that CDS lie within exon boundaries")
                .conflicts_with("no_fix_cds_within_exons_dc"))
        .arg(Arg::with_name("no_fix_cds_within_exons_dc")
                .long("no_fix_cds_within_exons_dc")
                .help("Report transcripts with CDS outside their exons without retyping them"))
        .arg(Arg::with_name("no_coding_transcripts_with_cds_dc")
                .long("no_coding_transcripts_with_cds_dc")
                .help("Do not check that coding transcripts have CDS")
                .conflicts_with("no_fix_coding_transcripts_with_cds_dc"))
        .arg(Arg::with_name("no_fix_coding_transcripts_with_cds_dc")
                .long("no_fix_coding_transcripts_with_cds_dc")
                .help("Report coding transcripts without CDS without retyping them"))
}

fn check_mode(args: &ArgMatches, check: &str) -> CheckMode {
    if args.is_present(format!("no_{}_dc", check)) {
        CheckMode::Off
    } else if args.is_present(format!("no_fix_{}_dc", check)) {
        CheckMode::Report
    } else {
        CheckMode::Fix
    }
}

fn type_aliases(args: &ArgMatches) -> crate::Result<TypeAliases> {
    let mut aliases = TypeAliases::default();
    for spec in args.values_of("type_alias").into_iter().flatten() {
        let _ = aliases.insert_spec(spec).map_err(Error::InvalidArgument)?;
    }
    Ok(aliases)
}

fn string_values(args: &ArgMatches, name: &str) -> Vec<String> {
    args.values_of(name)
        .map(|vals| vals.map(|v| v.to_owned()).collect())
        .unwrap_or_default()
}

/// Builds the run settings, with the legacy rewrites and checks on unless switched off.
fn options(args: &ArgMatches) -> crate::Result<ReformatOptions> {
    let mut extrapolations = Vec::new();
    if let Some(scaffold) = args.value_of("fabricate_transcripts_for_scaffold") {
        extrapolations.push(Extrapolation::Transcripts(scaffold.to_owned()));
    } else if let Some(scaffold) = args.value_of("extrapolate_genes_for_scaffold") {
        extrapolations.push(Extrapolation::Genes(scaffold.to_owned()));
    }
    if let Some(scaffold) = args.value_of("extrapolate_exons_for_scaffold") {
        extrapolations.push(Extrapolation::Exons(scaffold.to_owned()));
    } else if let Some(scaffold) = args.value_of("extrapolate_CDSs_for_scaffold") {
        extrapolations.push(Extrapolation::Cds(scaffold.to_owned()));
    }
    let name_mode = if args.is_present("overwrite_gene_names") {
        Some(NameMode::Overwrite)
    } else if args.is_present("infer_gene_names") {
        Some(NameMode::CopyIfMissing)
    } else {
        None
    };
    let split_on = match args.value_of("split_gff_when_gene_attribute") {
        Some(raw) => Some(raw.parse::<AttributeFilter>()?),
        None => None,
    };

    Ok(ReformatOptions {
        parse_mode: if args.is_present("lenient") { ParseMode::Lenient } else { ParseMode::Strict },
        aliases: type_aliases(args)?,
        grouping: if args.is_present("no_parentage") {
            CdsGrouping::Parentless
        } else {
            CdsGrouping::Parented
        },
        source: if args.is_present("keep_source") { None } else { Some(DEFAULT_SOURCE.to_owned()) },
        remap_scaffolds: !args.is_present("keep_scaffold_names"),
        synonyms_file: args.value_of("synonyms_file").map(PathBuf::from),
        name_mode,
        gene_prefix: args.value_of("gene_prefix").map(|v| v.to_owned()),
        prefixes: string_values(args, "prefixes"),
        name_prefixes: string_values(args, "name_prefixes"),
        extrapolations,
        split_on,
        checks: DataChecks {
            gene_names: !args.is_present("no_gene_names_dc"),
            cds_without_exons: check_mode(args, "cds_with_exons"),
            cds_outside_exons: check_mode(args, "cds_within_exons"),
            coding_without_cds: check_mode(args, "coding_transcripts_with_cds"),
        },
        check_fasta: !args.is_present("no_gff_fasta_scaffold_match_dc"),
        fasta: args.value_of("fasta").map(PathBuf::from),
        sort_order: if args.is_present("natural_sort") {
            SortOrder::Natural
        } else {
            SortOrder::Lexicographic
        },
        keep_attributes: args.is_present("keep_attributes"),
        finding_lists: !args.is_present("no_finding_lists"),
    })
}

pub fn run(args: &ArgMatches) -> crate::Result<()> {
    let input = args.value_of("input_gff").unwrap_or("-");
    let output = args.value_of("output_gff").unwrap_or("-");
    let options = options(args)?;
    let result = gffkit::reformat_file(input, output, &options)?;
    info!("reformatted {} gene(s) with {} transcript(s)",
          result.main.num_genes(), result.main.num_transcripts());
    if let Some(extracted) = result.extracted {
        info!("extracted {} gene(s)", extracted.num_genes());
    }
    Ok(())
}
