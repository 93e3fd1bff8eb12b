use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use crate::config::CONFIG;
use crate::llm::{ChainedCredentials, GeminiClient, GeminiSettings, ModelClient};
use crate::storyboard::assets::{Asset, AssetRegistry, AssetRole};
use crate::storyboard::error::StoryboardError;
use crate::storyboard::export::{export_scene, export_scenes};
use crate::storyboard::identity::{consistency_block, extract_identity, identity_summary};
use crate::storyboard::session::Storyboard;
use crate::storyboard::settings::{AspectRatio, Quality, RenderSettings};
use crate::storyboard::templates::{templates_for, ContentMode};

pub fn usage() -> &'static str {
    "Usage:
  storyboard templates [--mode listing|brand]
  storyboard identity --asset <role>=<path>...
  storyboard suggest --asset <role>=<path>... [--mode listing|brand] [--scene <n>]
  storyboard generate --asset <role>=<path>... [--mode listing|brand] [--brief <text>] [--scene <n>] [--edit <instruction>] [--prompt <n>=<text>]... [--quality standard|high] [--aspect 1:1|3:4|4:3|9:16|16:9] [--out <dir>]

Roles: container, lid, card-front, card-back, secondary-container, note-card"
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetArg {
    pub role: AssetRole,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateArgs {
    pub assets: Vec<AssetArg>,
    pub mode: ContentMode,
    pub brief: Option<String>,
    pub scene: Option<u32>,
    pub edit: Option<String>,
    /// Per-scene prompt overrides applied after any split.
    pub prompts: Vec<(u32, String)>,
    pub settings: RenderSettings,
    pub out_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Templates {
        mode: Option<ContentMode>,
    },
    Identity {
        assets: Vec<AssetArg>,
    },
    Suggest {
        assets: Vec<AssetArg>,
        mode: ContentMode,
        scene: Option<u32>,
    },
    Generate(GenerateArgs),
}

fn parse_asset_arg(value: &str) -> Result<AssetArg> {
    let (role, path) = value
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid --asset value '{value}', expected <role>=<path>"))?;
    let role = AssetRole::parse(role).ok_or_else(|| anyhow!("Unknown asset role: {role}"))?;
    let path = path.trim();
    if path.is_empty() {
        return Err(anyhow!("Missing path for --asset {}", role.as_str()));
    }
    Ok(AssetArg {
        role,
        path: PathBuf::from(path),
    })
}

fn parse_prompt_arg(value: &str) -> Result<(u32, String)> {
    let (id, prompt) = value
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid --prompt value '{value}', expected <scene>=<text>"))?;
    let id = id
        .trim()
        .parse::<u32>()
        .map_err(|_| anyhow!("Invalid scene id in --prompt: {id}"))?;
    Ok((id, prompt.trim().to_string()))
}

fn take_value<'a>(args: &'a [String], index: &mut usize, flag: &str) -> Result<&'a str> {
    *index += 1;
    args.get(*index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing value for {flag}"))
}

pub fn parse_cli_args(args: &[String]) -> Result<CliCommand> {
    let command = args
        .get(1)
        .map(String::as_str)
        .ok_or_else(|| anyhow!(usage()))?;
    if !matches!(command, "templates" | "identity" | "suggest" | "generate") {
        return Err(anyhow!("Unknown command: {command}\n{}", usage()));
    }

    let mut assets = Vec::new();
    let mut mode: Option<ContentMode> = None;
    let mut brief: Option<String> = None;
    let mut scene: Option<u32> = None;
    let mut edit: Option<String> = None;
    let mut prompts = Vec::new();
    let mut aspect_ratio = CONFIG.default_aspect_ratio;
    let mut quality = CONFIG.default_quality;
    let mut out_dir = CONFIG.output_dir.clone();

    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--asset" => {
                let value = take_value(args, &mut index, "--asset")?;
                assets.push(parse_asset_arg(value)?);
            }
            "--mode" => {
                let value = take_value(args, &mut index, "--mode")?;
                mode = Some(
                    ContentMode::parse(value)
                        .ok_or_else(|| anyhow!("Invalid --mode value: {value}"))?,
                );
            }
            "--brief" => {
                brief = Some(take_value(args, &mut index, "--brief")?.to_string());
            }
            "--scene" => {
                let value = take_value(args, &mut index, "--scene")?;
                scene = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| anyhow!("Invalid --scene value: {value}"))?,
                );
            }
            "--edit" => {
                edit = Some(take_value(args, &mut index, "--edit")?.to_string());
            }
            "--prompt" => {
                let value = take_value(args, &mut index, "--prompt")?;
                prompts.push(parse_prompt_arg(value)?);
            }
            "--quality" => {
                let value = take_value(args, &mut index, "--quality")?;
                quality =
                    Quality::parse(value).ok_or_else(|| anyhow!("Invalid --quality value: {value}"))?;
            }
            "--aspect" => {
                let value = take_value(args, &mut index, "--aspect")?;
                aspect_ratio = AspectRatio::parse(value)
                    .ok_or_else(|| anyhow!("Invalid --aspect value: {value}"))?;
            }
            "--out" => {
                out_dir = PathBuf::from(take_value(args, &mut index, "--out")?);
            }
            "--help" | "-h" => {
                return Err(anyhow!(usage()));
            }
            other => {
                return Err(anyhow!("Unknown {command} argument: {other}\n{}", usage()));
            }
        }
        index += 1;
    }

    if command != "templates" && assets.is_empty() {
        return Err(anyhow!("{command} needs at least one --asset"));
    }
    if edit.is_some() && scene.is_none() {
        return Err(anyhow!("--edit requires --scene"));
    }

    Ok(match command {
        "templates" => CliCommand::Templates { mode },
        "identity" => CliCommand::Identity { assets },
        "suggest" => CliCommand::Suggest {
            assets,
            mode: mode.unwrap_or(ContentMode::Listing),
            scene,
        },
        _ => CliCommand::Generate(GenerateArgs {
            assets,
            mode: mode.unwrap_or(ContentMode::Listing),
            brief,
            scene,
            edit,
            prompts,
            settings: RenderSettings {
                aspect_ratio,
                quality,
            },
            out_dir,
        }),
    })
}

async fn load_assets(args: &[AssetArg]) -> Result<Vec<(AssetRole, Asset)>> {
    let mut assets = Vec::with_capacity(args.len());
    for arg in args {
        let data = tokio::fs::read(&arg.path)
            .await
            .with_context(|| format!("Failed to read {}", arg.path.display()))?;
        let asset = Asset::from_upload(data, None)
            .ok_or_else(|| anyhow!("{} is not a supported image", arg.path.display()))?;
        assets.push((arg.role, asset));
    }
    Ok(assets)
}

fn build_client() -> Arc<dyn ModelClient> {
    Arc::new(GeminiClient::new(
        GeminiSettings::from_config(),
        Arc::new(ChainedCredentials::from_config()),
    ))
}

fn print_scenes(board: &Storyboard) {
    println!("== {} ==", board.mode().label());
    for scene in board.scenes() {
        println!("[{}] {}\n{}\n", scene.id, scene.title, scene.prompt);
    }
}

fn print_templates(mode: ContentMode) {
    println!("== {} ({} scenes) ==", mode.label(), mode.scene_count());
    for template in templates_for(mode) {
        println!("[{}] {}\n{}\n", template.index, template.title, template.default_prompt);
    }
}

pub async fn run(command: CliCommand) -> Result<()> {
    match command {
        CliCommand::Templates { mode } => {
            match mode {
                Some(mode) => print_templates(mode),
                None => {
                    print_templates(ContentMode::Listing);
                    print_templates(ContentMode::BrandContent);
                }
            }
            Ok(())
        }
        CliCommand::Identity { assets } => {
            let mut registry = AssetRegistry::new();
            for (role, asset) in load_assets(&assets).await? {
                registry.set_asset(role, asset);
            }
            let client = build_client();
            let identity =
                extract_identity(client.as_ref(), &CONFIG.retry_policy(), &registry).await?;
            println!("{}", identity_summary(&identity));
            println!("{}", consistency_block(&identity, 1));
            Ok(())
        }
        CliCommand::Suggest {
            assets,
            mode,
            scene,
        } => {
            let assets = load_assets(&assets).await?;
            let mut board = Storyboard::from_config(build_client(), mode).with_auto_suggest(false);
            board.upload_many(assets).await;
            match scene {
                Some(id) => board.request_suggest_one(id).await?,
                None => match board.request_suggest_all().await {
                    Ok(()) => {}
                    Err(err @ StoryboardError::MissingAssets(_)) => return Err(err.into()),
                    Err(err) => warn!("Showing default prompts: {}", err),
                },
            }
            print_scenes(&board);
            Ok(())
        }
        CliCommand::Generate(args) => run_generate(args).await,
    }
}

async fn run_generate(args: GenerateArgs) -> Result<()> {
    let assets = load_assets(&args.assets).await?;
    let mut board = Storyboard::from_config(build_client(), args.mode).with_auto_suggest(args.brief.is_none());
    board.set_settings(args.settings);
    board.upload_many(assets).await;

    if let Some(brief) = &args.brief {
        board.request_split(brief).await?;
    } else if let Some(advisory) = board.advisory() {
        warn!("Rendering with default prompts: {}", advisory);
    }
    for (id, prompt) in &args.prompts {
        board.set_prompt(*id, prompt.as_str())?;
    }

    let settings = board.settings();
    info!(
        "Rendering {} scenes at {} ({} quality)",
        board.scenes().len(),
        settings.aspect_ratio.as_str(),
        settings.quality.as_str()
    );

    match args.scene {
        Some(id) => {
            board.request_render(id, false, None).await?;
            if let Some(instruction) = &args.edit {
                board.request_render(id, true, Some(instruction)).await?;
            }
            let scene = board
                .scene(id)
                .ok_or(StoryboardError::UnknownScene(id))?;
            if let Some(path) = export_scene(scene, &args.out_dir).await? {
                println!("{}", path.display());
            }
        }
        None => {
            let report = board.request_render_all().await;
            info!(
                "Render batch finished: rendered={} failed={} identity_used={}",
                report.rendered.len(),
                report.failed.len(),
                report.identity_used
            );
            for (id, detail) in &report.failed {
                eprintln!("scene {id} failed: {detail}");
            }
            for path in export_scenes(board.scenes(), &args.out_dir).await? {
                println!("{}", path.display());
            }
            if report.rendered.is_empty() {
                return Err(anyhow!("No scene could be rendered"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        std::iter::once("storyboard")
            .chain(values.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn parses_generate_flags() {
        let command = parse_cli_args(&args(&[
            "generate",
            "--asset",
            "jar=/tmp/jar.png",
            "--asset",
            "box=/tmp/box.png",
            "--mode",
            "brand",
            "--scene",
            "2",
            "--edit",
            "warmer light",
            "--quality",
            "hq",
            "--aspect",
            "9:16",
            "--out",
            "renders",
            "--prompt",
            "3=knolling on slate",
        ]))
        .unwrap();

        let CliCommand::Generate(generate) = command else {
            panic!("expected generate");
        };
        assert_eq!(generate.assets.len(), 2);
        assert_eq!(generate.assets[0].role, AssetRole::Container);
        assert_eq!(generate.assets[1].role, AssetRole::SecondaryContainer);
        assert_eq!(generate.mode, ContentMode::BrandContent);
        assert_eq!(generate.scene, Some(2));
        assert_eq!(generate.edit.as_deref(), Some("warmer light"));
        assert_eq!(generate.settings.quality, Quality::High);
        assert_eq!(generate.settings.aspect_ratio, AspectRatio::Portrait9x16);
        assert_eq!(generate.out_dir, PathBuf::from("renders"));
        assert_eq!(generate.prompts, vec![(3, "knolling on slate".to_string())]);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_cli_args(&args(&[])).is_err());
        assert!(parse_cli_args(&args(&["paint"])).is_err());
        assert!(parse_cli_args(&args(&["identity"])).is_err());
        assert!(parse_cli_args(&args(&["suggest", "--asset", "poster=/x.png"])).is_err());
        assert!(parse_cli_args(&args(&["generate", "--asset", "jar=/x.png", "--edit", "x"])).is_err());
        assert!(parse_cli_args(&args(&["generate", "--asset", "jar=/x.png", "--scene"])).is_err());
        assert!(parse_cli_args(&args(&["generate", "--asset", "jar=/x.png", "--prompt", "two=x"])).is_err());
    }

    #[test]
    fn templates_needs_no_assets() {
        assert_eq!(
            parse_cli_args(&args(&["templates", "--mode", "listing"])).unwrap(),
            CliCommand::Templates {
                mode: Some(ContentMode::Listing)
            }
        );
    }
}
