use crate::config::BrowserConfigOverrides;
use crate::resource::{ResourceFilter, SourceId};
use anyhow::{anyhow, bail, Result};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "config/resources.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List(ResourceFilter),
    Find(String),
    Stats,
    Preview { name: String, output: PathBuf },
    /// Keeps running and reloads sources whose files change.
    Watch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config: PathBuf,
    pub quality: Option<String>,
    pub profile: Option<String>,
    pub source: Option<SourceId>,
    pub command: Command,
}

impl CliArgs {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = PathBuf::from(DEFAULT_CONFIG_PATH);
        let mut quality = None;
        let mut profile = None;
        let mut source = None;
        let mut positional = Vec::new();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw) = iter.next() {
            let arg = raw.as_ref();
            let Some(key) = arg.strip_prefix("--") else {
                positional.push(arg.to_string());
                continue;
            };
            let value = iter.next().ok_or_else(|| anyhow!("Expected a value after '{arg}'"))?.as_ref().to_string();
            match key {
                "config" => config = PathBuf::from(value),
                "quality" => quality = Some(value),
                "profile" => profile = Some(value),
                "source" => source = Some(SourceId::from(value.as_str())),
                _ => bail!("Unknown flag '{arg}'. Supported flags: --config, --quality, --profile, --source."),
            }
        }
        let command = parse_command(&positional)?;
        Ok(Self { config, quality, profile, source, command })
    }

    pub fn config_overrides(&self) -> BrowserConfigOverrides {
        BrowserConfigOverrides { quality: self.quality.clone(), profile: self.profile.clone() }
    }
}

fn parse_command(positional: &[String]) -> Result<Command> {
    let Some((name, rest)) = positional.split_first() else {
        bail!("Missing command. Use one of: list [filter], find <name>, stats, preview <name> <out.png>, watch.");
    };
    let command = match (name.as_str(), rest) {
        ("list", []) => Command::List(ResourceFilter::All),
        ("list", [filter]) => Command::List(filter.parse()?),
        ("find", [resource]) => Command::Find(resource.clone()),
        ("stats", []) => Command::Stats,
        ("watch", []) => Command::Watch,
        ("preview", [resource, output]) => Command::Preview { name: resource.clone(), output: PathBuf::from(output) },
        ("list" | "find" | "stats" | "preview" | "watch", _) => bail!("Wrong number of arguments for '{name}'."),
        _ => bail!("Unknown command '{name}'."),
    };
    Ok(command)
}
