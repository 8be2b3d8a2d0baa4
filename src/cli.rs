use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};

pub fn build_cli() -> ArgMatches<'static> {
	App::new("fibrescan")
		.version("v0.2.0")
		.author("ktheindifferent")
		.about("Extracts and quantifies fibrous networks in SHG/PL micrographs")
		.settings(&[AppSettings::SubcommandRequiredElseHelp, AppSettings::VersionlessSubcommands])
		.arg(
			Arg::with_name("v")
				.short("v")
				.multiple(true)
				.global(true)
				.help("Sets the level of logging verbosity"),
		)
		.subcommand(build_analyse_subcommand())
		.get_matches()
}

fn build_analyse_subcommand() -> App<'static, 'static> {
	SubCommand::with_name("analyse")
		.about("Analyse a set of multi-channel micrograph images")
		.arg(
			Arg::with_name("PATHS")
				.help("Image files or directories to analyse")
				.required(true)
				.multiple(true)
				.index(1),
		)
		.arg(
			Arg::with_name("SIGMA")
				.long("sigma")
				.value_name("SIGMA")
				.help("Gaussian scale for the ridge filter and tensor maps. Default 0.5")
				.empty_values(false),
		)
		.arg(
			Arg::with_name("ALPHA")
				.long("alpha")
				.value_name("ALPHA")
				.help("Scaling of the Otsu threshold used by the hysteresis gate. Default 0.5")
				.empty_values(false),
		)
		.arg(
			Arg::with_name("LOW_CLIP")
				.long("low-clip")
				.value_name("PERCENTILE")
				.help("Lower clip percentile applied to every channel. Default 1")
				.empty_values(false),
		)
		.arg(
			Arg::with_name("HIGH_CLIP")
				.long("high-clip")
				.value_name("PERCENTILE")
				.help("Upper clip percentile applied to every channel. Default 99")
				.empty_values(false),
		)
		.arg(
			Arg::with_name("NL_PATCH")
				.long("nl-patch")
				.value_name("PIXELS")
				.help("Patch size of the non-local means denoise. Default 5")
				.empty_values(false),
		)
		.arg(
			Arg::with_name("NL_DISTANCE")
				.long("nl-distance")
				.value_name("PIXELS")
				.help("Search distance of the non-local means denoise. Default 35")
				.empty_values(false),
		)
		.arg(
			Arg::with_name("OW_NETWORK")
				.long("overwrite-network")
				.help("Recompute networks even when a stored network exists"),
		)
		.arg(
			Arg::with_name("OW_SEGMENT")
				.long("overwrite-segment")
				.help("Recompute segments even when stored segments exist"),
		)
		.arg(
			Arg::with_name("OW_METRIC")
				.long("overwrite-metric")
				.help("Recompute metrics even when stored metric tables exist"),
		)
		.arg(
			Arg::with_name("SAVE_FIGURES")
				.long("save-figures")
				.help("Write tubeness and segment figures beside each image"),
		)
		.arg(
			Arg::with_name("WORKERS")
				.long("workers")
				.value_name("N")
				.help("Number of images analysed concurrently. Default 1")
				.empty_values(false),
		)
		.arg(
			Arg::with_name("STRICT")
				.long("strict")
				.help("Exit with a non-zero status when any image fails"),
		)
}
