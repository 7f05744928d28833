use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use vppforge::{
    archive::ZipArchiveCodec,
    config::AppConfig,
    game,
    install::{self, InstallManifest, Selections},
    known::KnownFiles,
    modinfo::ModInfo,
    options::ModOption,
    package::stage_package,
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

struct GlobalOptions {
    format: OutputFormat,
    verbosity: u8,
}

enum CliCommand {
    Init { game_root: Option<PathBuf>, rescan: bool },
    Inputs(PathBuf),
    Install {
        packages: Vec<PathBuf>,
        selections: Selections,
    },
    Uninstall { vanilla: bool },
    RecordUpdate(Vec<String>),
    Status,
    Paths,
    Help,
    Version,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (global, tokens) = parse_global_options(&args)?;
    init_logging(global.verbosity);
    let command = parse_command(&tokens)?;
    match command {
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Version => {
            println!("vppforge v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let config = AppConfig::load_or_create()?;
            run_command(config, command, global.format)
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn parse_global_options(args: &[String]) -> Result<(GlobalOptions, Vec<String>)> {
    let mut format = OutputFormat::Text;
    let mut verbosity = 0;
    let mut tokens = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--format=") {
            format = OutputFormat::parse(value)
                .ok_or_else(|| anyhow!("Unknown format: {value} (use 'text' or 'json')"))?;
            continue;
        }
        if arg == "--format" {
            let value = iter.next().ok_or_else(|| anyhow!("--format requires a value"))?;
            format = OutputFormat::parse(value)
                .ok_or_else(|| anyhow!("Unknown format: {value} (use 'text' or 'json')"))?;
            continue;
        }
        if arg == "--verbose" {
            verbosity += 1;
            continue;
        }
        if arg.starts_with("-v") && arg.chars().skip(1).all(|ch| ch == 'v') {
            verbosity += (arg.len() - 1) as u8;
            continue;
        }
        tokens.push(arg.to_string());
    }

    Ok((GlobalOptions { format, verbosity }, tokens))
}

fn parse_command(tokens: &[String]) -> Result<CliCommand> {
    let Some(head) = tokens.first() else {
        return Ok(CliCommand::Help);
    };
    let rest = tokens.get(1..).unwrap_or(&[]);
    match head.as_str() {
        "--help" | "-h" | "help" => Ok(CliCommand::Help),
        "--version" | "-V" | "version" => Ok(CliCommand::Version),
        "init" => {
            let mut game_root = None;
            let mut rescan = false;
            let mut iter = rest.iter();
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--game-root" => {
                        let value = iter
                            .next()
                            .ok_or_else(|| anyhow!("--game-root requires a path"))?;
                        game_root = Some(PathBuf::from(value));
                    }
                    value if value.starts_with("--game-root=") => {
                        game_root = Some(PathBuf::from(value.trim_start_matches("--game-root=")));
                    }
                    "--rescan" => rescan = true,
                    other => bail!("Unknown init option: {other}"),
                }
            }
            Ok(CliCommand::Init { game_root, rescan })
        }
        "inputs" => {
            let package = rest
                .first()
                .ok_or_else(|| anyhow!("inputs requires a package path"))?;
            Ok(CliCommand::Inputs(PathBuf::from(package)))
        }
        "install" => {
            let mut packages = Vec::new();
            let mut selections = Selections::new();
            let mut iter = rest.iter();
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--select" => {
                        let value = iter
                            .next()
                            .ok_or_else(|| anyhow!("--select requires name=index"))?;
                        selections.push_index_arg(value)?;
                    }
                    "--custom" => {
                        let value = iter
                            .next()
                            .ok_or_else(|| anyhow!("--custom requires name=text"))?;
                        selections.push_custom_arg(value)?;
                    }
                    value if value.starts_with("--select=") => {
                        selections.push_index_arg(value.trim_start_matches("--select="))?;
                    }
                    value if value.starts_with("--custom=") => {
                        selections.push_custom_arg(value.trim_start_matches("--custom="))?;
                    }
                    value if value.starts_with("--") => bail!("Unknown install option: {value}"),
                    path => packages.push(PathBuf::from(path)),
                }
            }
            if packages.is_empty() {
                bail!("install requires one or more package paths");
            }
            Ok(CliCommand::Install {
                packages,
                selections,
            })
        }
        "uninstall" => {
            let vanilla = rest.iter().any(|arg| arg == "--vanilla");
            Ok(CliCommand::Uninstall { vanilla })
        }
        "record-update" => {
            if rest.is_empty() {
                bail!("record-update requires one or more game-relative paths");
            }
            Ok(CliCommand::RecordUpdate(rest.to_vec()))
        }
        "status" => Ok(CliCommand::Status),
        "paths" => Ok(CliCommand::Paths),
        other => bail!("Unknown command: {other} (see 'vppforge help')"),
    }
}

fn run_command(mut config: AppConfig, command: CliCommand, format: OutputFormat) -> Result<()> {
    match command {
        CliCommand::Init { game_root, rescan } => init(&mut config, game_root, rescan, format),
        CliCommand::Inputs(package) => list_inputs(&config, &package, format),
        CliCommand::Install {
            packages,
            selections,
        } => {
            require_game_root(&config)?;
            let report = install::install_mods(&config, &packages, &selections, &ZipArchiveCodec)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => {
                    if report.rolled_back > 0 {
                        println!("Rolled back {} file(s) from the previous install", report.rolled_back);
                    }
                    for archive in &report.archives {
                        println!(
                            "{}: {} swapped, {} edited",
                            archive.archive,
                            archive.swapped.len(),
                            archive.edited.len()
                        );
                    }
                    for file in &report.loose_files {
                        println!("copied {file}");
                    }
                    for warning in &report.warnings {
                        println!("warning: {warning}");
                    }
                    println!("Installed {}", report.mods.join(", "));
                }
            }
            Ok(())
        }
        CliCommand::Uninstall { vanilla } => {
            require_game_root(&config)?;
            let vanilla = vanilla || config.rollback_to_vanilla;
            let rolled_back = install::uninstall(&config, vanilla)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&rolled_back)?),
                OutputFormat::Text => {
                    if rolled_back.is_empty() {
                        println!("Nothing installed.");
                    }
                    for file in rolled_back {
                        println!("{}: {:?}", file.path, file.outcome);
                    }
                }
            }
            Ok(())
        }
        CliCommand::RecordUpdate(paths) => {
            require_game_root(&config)?;
            let recorded = install::record_update(&config, &paths)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&recorded)?),
                OutputFormat::Text => {
                    for (path, location) in recorded {
                        match location {
                            Some(location) => println!("{path} -> {}", location.display()),
                            None => println!("{path}: not present, skipped"),
                        }
                    }
                }
            }
            Ok(())
        }
        CliCommand::Status => {
            let statuses = install::status(&config)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
                OutputFormat::Text => {
                    if statuses.is_empty() {
                        println!("No mods installed.");
                    }
                    for status in statuses {
                        let state = match status.intact {
                            Some(true) => "as installed",
                            Some(false) => "changed since install",
                            None => "missing",
                        };
                        println!("{:<48} {:<10} {state}", status.path, format!("{:?}", status.kind));
                    }
                }
            }
            Ok(())
        }
        CliCommand::Paths => list_paths(&config, format),
        CliCommand::Help | CliCommand::Version => Ok(()),
    }
}

fn require_game_root(config: &AppConfig) -> Result<()> {
    if config.game_root.as_os_str().is_empty() {
        bail!("Game root not set; run 'vppforge init --game-root <dir>'");
    }
    if !config.has_game_root() {
        log::warn!(
            "{:?} does not look like a {} install",
            config.game_root,
            game::GAME_NAME
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct InitSummary {
    game_root: PathBuf,
    known_files: usize,
    scanned: bool,
}

fn init(
    config: &mut AppConfig,
    game_root: Option<PathBuf>,
    rescan: bool,
    format: OutputFormat,
) -> Result<()> {
    if let Some(game_root) = game_root {
        let game_root = game_root
            .canonicalize()
            .with_context(|| format!("resolve game root {game_root:?}"))?;
        config.game_root = game_root;
        config.save()?;
    }
    require_game_root(config)?;

    let known_path = config.known_files_path();
    let mut known = KnownFiles::load(&known_path)?;
    let scan = known.is_empty() || rescan;
    if scan {
        if !InstallManifest::load(&config.manifest_path())?.is_empty() {
            bail!("mods are installed; uninstall them before scanning game files");
        }
        known = KnownFiles::scan(&config.game_root)?;
        known.save(&known_path)?;
    }

    let summary = InitSummary {
        game_root: config.game_root.clone(),
        known_files: known.len(),
        scanned: scan,
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => {
            println!("Game root: {}", summary.game_root.display());
            if summary.scanned {
                println!("Recorded {} known game file(s)", summary.known_files);
            } else {
                println!(
                    "{} known game file(s) already recorded (use --rescan to refresh)",
                    summary.known_files
                );
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct InputItem {
    name: String,
    display_name: String,
    allow_custom: bool,
    options: Vec<String>,
    default: String,
}

fn list_inputs(config: &AppConfig, package: &Path, format: OutputFormat) -> Result<()> {
    let staged = stage_package(package, &config.temp_root())?;
    let modinfo = ModInfo::load(&staged.root)?;
    let items: Vec<InputItem> = modinfo
        .resolve_inputs()?
        .into_iter()
        .map(|input| InputItem {
            options: input
                .options()
                .iter()
                .map(|option| option.name().to_string())
                .collect(),
            default: match input.selected_option() {
                ModOption::Default => "-".to_string(),
                option => option.name().to_string(),
            },
            name: input.name,
            display_name: input.display_name,
            allow_custom: input.allow_custom,
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
        OutputFormat::Text => {
            println!("{} ({} change(s))", modinfo.name, modinfo.changes.len());
            if items.is_empty() {
                println!("No user inputs.");
            }
            for item in items {
                let custom = if item.allow_custom { ", custom allowed" } else { "" };
                println!("{} [{}{custom}]", item.display_name, item.name);
                for (index, option) in item.options.iter().enumerate() {
                    println!("  {index}: {option}");
                }
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct PathsSummary {
    game_root: PathBuf,
    data_dir: PathBuf,
    backup_root: PathBuf,
    known_files: PathBuf,
    manifest: PathBuf,
    temp_root: PathBuf,
}

fn list_paths(config: &AppConfig, format: OutputFormat) -> Result<()> {
    let summary = PathsSummary {
        game_root: config.game_root.clone(),
        data_dir: config.data_dir.clone(),
        backup_root: config.backup_root(),
        known_files: config.known_files_path(),
        manifest: config.manifest_path(),
        temp_root: config.temp_root(),
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => {
            println!("Game root:   {}", summary.game_root.display());
            println!("Data dir:    {}", summary.data_dir.display());
            println!("Backups:     {}", summary.backup_root.display());
            println!("Known files: {}", summary.known_files.display());
            println!("Manifest:    {}", summary.manifest.display());
            println!("Temp:        {}", summary.temp_root.display());
        }
    }
    Ok(())
}

fn print_help() {
    println!("vppforge v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  vppforge init [--game-root <dir>] [--rescan]  Set the game and record shipped files");
    println!("  vppforge inputs <package>                     List a mod's user inputs");
    println!("  vppforge install <package>... [options]       Install mods, replacing the last install");
    println!("  vppforge uninstall [--vanilla]                Roll back the last install");
    println!("  vppforge record-update <path>...              Record officially updated files");
    println!("  vppforge status                               Show installed files");
    println!("  vppforge paths                                Show tool paths");
    println!();
    println!("Install options:");
    println!("  --select <input>=<index>                      Pick an option by index");
    println!("  --custom <input>=<text>                       Use a custom value");
    println!();
    println!("Global options:");
    println!("  --format <json|text>                          Output format");
    println!("  -v, -vv                                       Increase log verbosity");
    println!("  -h, --help                                    Show help");
    println!("  -V, --version                                 Show version");
}
