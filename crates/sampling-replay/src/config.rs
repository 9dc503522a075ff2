use std::path::{Path, PathBuf};

use derivative::Derivative;
use sampling_core::{GrammarSource, ModelInfo, SamplingParams};
use serde::{Deserialize, Serialize};

use crate::build_path;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelOption,
    pub sampling: SamplingParams,
    pub replay: ReplayOption,
}

impl Config {
    /// Resolve relative file paths against `root`, normally the directory of the config file.
    pub fn resolve(mut self, root: impl AsRef<Path>) -> anyhow::Result<Self> {
        let root = root.as_ref();
        if let Some(GrammarSource::Path(path)) = &mut self.sampling.grammar {
            *path = build_path(root, path.as_path())?;
        }
        if let Some(path) = &mut self.replay.scores {
            *path = build_path(root, path.as_path())?;
        }
        Ok(self)
    }
}

#[derive(Debug, Derivative, Clone, Serialize, Deserialize)]
#[derivative(Default)]
#[serde(default)]
pub struct ModelOption {
    /// Size of every score vector.
    #[derivative(Default(value = "65536"))]
    pub num_vocab: usize,
    /// Id of the newline token.
    #[derivative(Default(value = "11"))]
    pub token_nl: u32,
    /// Text of every token by id. Needed for grammars and for printing tokens.
    pub tokens: Vec<String>,
}

impl From<ModelOption> for ModelInfo {
    fn from(value: ModelOption) -> Self {
        let ModelOption {
            num_vocab,
            token_nl,
            tokens,
        } = value;
        let tokens = tokens.into_iter().map(String::into_bytes).collect();
        Self {
            num_vocab,
            token_nl,
            tokens,
        }
    }
}

#[derive(Debug, Derivative, Clone, Serialize, Deserialize)]
#[derivative(Default)]
#[serde(default)]
pub struct ReplayOption {
    /// JSON file holding an array of score vectors.
    pub scores: Option<PathBuf>,
    /// Restrict candidates to grammar-legal tokens before sampling.
    pub grammar_first: bool,
    /// Advance the grammar with every selected token.
    #[derivative(Default(value = "true"))]
    pub apply_grammar: bool,
    /// Stop once the grammar reaches a terminal state.
    #[derivative(Default(value = "true"))]
    pub stop_on_finish: bool,
}

#[cfg(test)]
mod tests {
    use sampling_core::Mirostat;

    use super::*;

    #[test]
    fn test_parse_config() {
        let config: Config = toml::from_str(
            r#"
            [model]
            num_vocab = 3
            token_nl = 2
            tokens = ["a", "b", "\n"]

            [sampling]
            temp = 0.7
            mirostat = 2
            grammar = { path = "grammar.ebnf" }

            [replay]
            scores = "scores.json"
            grammar_first = true
            "#,
        )
        .unwrap();

        assert_eq!(config.sampling.temp, 0.7);
        assert_eq!(config.sampling.mirostat, Mirostat::V2);
        assert!(config.replay.grammar_first);
        assert!(config.replay.apply_grammar);

        let config = config.resolve("assets/configs").unwrap();
        assert_eq!(
            config.sampling.grammar,
            Some(GrammarSource::Path("assets/configs/grammar.ebnf".into()))
        );
        assert_eq!(
            config.replay.scores,
            Some(PathBuf::from("assets/configs/scores.json"))
        );

        let info = ModelInfo::from(config.model);
        assert_eq!(info.num_vocab, 3);
        assert_eq!(info.tokens[2], b"\n".to_vec());
    }

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.model.num_vocab, 65536);
        assert!(config.replay.scores.is_none());
        assert!(config.replay.stop_on_finish);
        assert!(config.sampling.grammar.is_none());
    }

    #[test]
    fn test_resolve_rejects_parent() {
        let config = Config {
            replay: ReplayOption {
                scores: Some("../scores.json".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.resolve("assets").is_err());
    }
}
