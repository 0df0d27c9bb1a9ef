//! Document languages and the `#lang` loader.
//!
//! A markup document names its language on its first line:
//!
//! ```text
//! #lang doc jsdoc
//! ```
//!
//! The first token picks a [`Language`]; further tokens name
//! [`Vocabulary`] bundles whose handlers are slurped into the document's
//! command table. Loading then runs three phases: parse, expand and
//! process.

use crate::context::ExecutionContext;
use crate::error::{CommandError, SyntaxError};
use crate::expand::{CommandTable, Datum};
use crate::flow::{decode_flow, BlockLevel, Flow};
use crate::reader::parse_body;
use crate::syntax::ParseNode;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

static RE_LANG_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#lang ([^ ]+)(?: +(.+))?$").expect("valid #lang regex"));

/// A named bundle of command handlers
pub trait Vocabulary<V>: Send + Sync {
    fn name(&self) -> &str;

    fn contribute(&self, table: &mut CommandTable<V>);

    /// Other vocabularies that must be loaded alongside this one
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Runs once every requested vocabulary has contributed.
    fn dependency_resolve(&self, _ctx: &mut ExecutionContext<V>) {}
}

/// A document language: how to parse, expand and process a document body.
#[async_trait]
pub trait Language<V>: Send + Sync
where
    V: BlockLevel + Send + Sync + 'static,
{
    fn name(&self) -> &str;

    /// Handlers the language always brings along.
    fn contribute(&self, _table: &mut CommandTable<V>) {}

    fn parse(
        &self,
        body: &str,
        ctx: &mut ExecutionContext<V>,
    ) -> Result<Vec<ParseNode>, SyntaxError> {
        parse_body(body, ctx)
    }

    async fn expand(
        &self,
        nodes: Vec<ParseNode>,
        ctx: &mut ExecutionContext<V>,
    ) -> Result<Vec<Datum<V>>, CommandError> {
        crate::expand::expand(&nodes, ctx).await
    }

    fn process(
        &self,
        expanded: Vec<Datum<V>>,
        _ctx: &mut ExecutionContext<V>,
    ) -> Result<Vec<Flow<V>>, CommandError> {
        Ok(decode_flow(expanded))
    }
}

/// Known languages and vocabularies, by name
pub struct LanguageRegistry<V> {
    languages: HashMap<String, Arc<dyn Language<V>>>,
    vocabularies: HashMap<String, Arc<dyn Vocabulary<V>>>,
}

impl<V> Default for LanguageRegistry<V> {
    fn default() -> Self {
        Self {
            languages: HashMap::new(),
            vocabularies: HashMap::new(),
        }
    }
}

impl<V> LanguageRegistry<V>
where
    V: BlockLevel + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_language(&mut self, language: Arc<dyn Language<V>>) {
        self.languages.insert(language.name().to_string(), language);
    }

    pub fn register_vocabulary(&mut self, vocabulary: Arc<dyn Vocabulary<V>>) {
        self.vocabularies
            .insert(vocabulary.name().to_string(), vocabulary);
    }

    pub fn language(&self, name: &str) -> Option<Arc<dyn Language<V>>> {
        self.languages.get(name).cloned()
    }

    pub fn vocabulary(&self, name: &str) -> Option<Arc<dyn Vocabulary<V>>> {
        self.vocabularies.get(name).cloned()
    }

    /// Load `names` and their dependencies into the context's command
    /// table, then run each dependency-resolve hook.
    pub fn slurp(
        &self,
        names: &[String],
        ctx: &mut ExecutionContext<V>,
    ) -> Result<(), SyntaxError> {
        let mut seen = HashSet::new();
        let mut loaded = Vec::new();
        let mut pending: Vec<String> = names.iter().rev().cloned().collect();
        while let Some(name) = pending.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let vocabulary = self
                .vocabulary(&name)
                .ok_or_else(|| SyntaxError::UnknownVocabulary(name.clone()))?;
            vocabulary.contribute(ctx.commands_mut());
            pending.extend(vocabulary.dependencies().into_iter().rev());
            loaded.push(vocabulary);
        }
        for vocabulary in loaded {
            vocabulary.dependency_resolve(ctx);
        }
        Ok(())
    }
}

/// Parsed `#lang` directive
#[derive(Debug, Clone, PartialEq)]
pub struct LangLine {
    pub language: String,
    pub langbits: Vec<String>,
    /// Bytes taken by the line, including its newline
    pub len: usize,
}

/// Parse the `#lang` line at the top of a markup document.
pub fn parse_lang_line(doc: &str) -> Result<LangLine, SyntaxError> {
    let newline = doc.find('\n').ok_or(SyntaxError::NoNewline)?;
    let line = doc[..newline].trim_end_matches('\r');
    let caps = RE_LANG_LINE
        .captures(line)
        .ok_or_else(|| SyntaxError::BadLangLine(line.to_string()))?;

    let langbits = caps
        .get(2)
        .map(|m| {
            m.as_str()
                .split(' ')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(LangLine {
        language: caps[1].to_string(),
        langbits,
        len: newline + 1,
    })
}

/// How a document's language is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocType {
    /// At-form markup that identifies its own language with `#lang`
    Markup,
    /// Anything else; the language comes from [`LoadOptions::lang`]
    Plain,
}

impl DocType {
    pub fn from_path(path: &str) -> Self {
        match path.rsplit_once('.').map(|(_, ext)| ext) {
            Some("scry") => DocType::Markup,
            _ => DocType::Plain,
        }
    }
}

/// Options for [`parse_document`]
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Used when there is no path to sniff the document type from
    pub doc_type: Option<DocType>,
    /// Fallback language when the document does not name one
    pub lang: Option<String>,
    /// Overrides the detected language
    pub force_lang: Option<String>,
}

/// A fully processed document
pub struct Document<V> {
    pub language: String,
    /// The language the document asked for, before any forcing
    pub detected_language: String,
    pub langbits: Vec<String>,
    pub stream: Vec<Flow<V>>,
    pub ctx: ExecutionContext<V>,
}

/// Parse, expand and process a document.
pub async fn parse_document<V>(
    registry: &LanguageRegistry<V>,
    text: &str,
    path: Option<&str>,
    options: &LoadOptions,
) -> Result<Document<V>, CommandError>
where
    V: BlockLevel + Send + Sync + 'static,
{
    parse_document_with(registry, text, path, options, |_| {}).await
}

/// Like [`parse_document`], letting the caller prepare the context (for
/// instance push named values) before parsing starts.
pub async fn parse_document_with<V, F>(
    registry: &LanguageRegistry<V>,
    text: &str,
    path: Option<&str>,
    options: &LoadOptions,
    setup: F,
) -> Result<Document<V>, CommandError>
where
    V: BlockLevel + Send + Sync + 'static,
    F: FnOnce(&mut ExecutionContext<V>),
{
    let doc_type = match path {
        Some(path) => DocType::from_path(path),
        None => options.doc_type.unwrap_or(DocType::Plain),
    };

    let lang_line = match doc_type {
        DocType::Markup => Some(parse_lang_line(text)?),
        DocType::Plain => None,
    };

    let detected_language = match (&lang_line, &options.lang) {
        (Some(line), _) => line.language.clone(),
        (None, Some(lang)) => lang.clone(),
        (None, None) => return Err(SyntaxError::NoLanguage.into()),
    };
    let language_name = options
        .force_lang
        .clone()
        .unwrap_or_else(|| detected_language.clone());
    let langbits = lang_line
        .as_ref()
        .map(|l| l.langbits.clone())
        .unwrap_or_default();

    let language = registry
        .language(&language_name)
        .ok_or_else(|| SyntaxError::UnknownLanguage(language_name.clone()))?;

    tracing::info!(
        file = path.unwrap_or("<anonymous>"),
        language = %language_name,
        langbits = ?langbits,
        "loading language"
    );

    let mut ctx = ExecutionContext::new(path.unwrap_or("<anonymous>"), text);
    language.contribute(ctx.commands_mut());
    registry.slurp(&langbits, &mut ctx)?;
    setup(&mut ctx);

    let body = match &lang_line {
        Some(line) => {
            // keep error positions absolute
            ctx.bump_unconsumed_index(line.len);
            &text[line.len..]
        }
        None => text,
    };

    let parsed = language
        .parse(body, &mut ctx)
        .map_err(|err| ctx.log_parse_failure(err, None))?;
    let expanded = language.expand(parsed, &mut ctx).await?;
    let stream = language.process(expanded, &mut ctx)?;

    Ok(Document {
        language: language_name,
        detected_language,
        langbits,
        stream,
        ctx,
    })
}
