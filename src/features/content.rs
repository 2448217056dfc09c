//! Page content features (`ct_`)
//!
//! Built from the body already fetched by the resolver probe; no second
//! request is made. The HTML is parsed once into a [`PageContext`] that owns
//! every count the extractors need, so the parsed document never outlives
//! the synchronous parse step.

use crate::features::{
    evaluate, manifest_names, shannon_entropy, FeatureError, FeatureFamily, FeatureRecord,
    FeatureSet, FeatureValue, Manifest,
};
use crate::resolver::ResolvedUrl;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashMap;

/// Tags counted one by one
const COUNTED_TAGS: &[&str] = &[
    "script", "style", "img", "a", "h1", "h2", "h3", "h4", "h5", "h6", "table", "form", "input",
    "[hidden]", "input[type=hidden]", "embed", "object", "iframe", "meta", "title", "head",
    "body", "html", "*", "script[src^=http]", "a[href^=http]",
];

/// Linked file extensions counted by `ct_num_files`
const FILE_EXTENSIONS: &[&str] = &["pdf", "doc", "docx", "xls", "xlsx", "mp3", "mp4", "php"];

/// Elements whose text is not visible page text
const INVISIBLE: &[&str] = &["script", "style", "noscript", "template"];

/// Owned summary of a probed page
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    has_response: bool,
    status: Option<u16>,
    num_redirects: usize,
    content_type: String,
    connection: String,
    server: String,
    content: String,
    text: String,
    sentences: Vec<String>,
    tokens: Vec<String>,
    tag_counts: HashMap<&'static str, usize>,
    script_texts: Vec<String>,
    num_comments: usize,
    num_files: usize,
}

impl PageContext {
    /// The context of a URL whose probe failed
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(resolved: &ResolvedUrl) -> Self {
        let Some(probe) = resolved.probe() else {
            return Self::empty();
        };

        let mut ctx = Self {
            has_response: true,
            status: Some(probe.status),
            num_redirects: resolved.redirect_history().len(),
            ..Self::default()
        };

        if !probe.headers.is_empty() {
            ctx.content_type = probe.header("content-type").unwrap_or("").to_string();
            ctx.connection = probe.header("connection").unwrap_or("close").to_string();
            ctx.server = probe.header("server").unwrap_or("unknown").to_string();
        }

        if !probe.body.trim().is_empty() {
            ctx.parse_body(&probe.body);
        }

        ctx
    }

    fn parse_body(&mut self, body: &str) {
        let document = Html::parse_document(body);

        let mut visible = Vec::new();
        for node in document.tree.root().descendants() {
            if node.value().is_comment() {
                self.num_comments += 1;
                continue;
            }
            let Some(text) = node.value().as_text() else {
                continue;
            };
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|e| INVISIBLE.contains(&e.name()))
            });
            let trimmed = text.trim();
            if !hidden && !trimmed.is_empty() {
                visible.push(trimmed.to_string());
            }
        }
        self.text = visible.join("\n");

        if !self.text.is_empty() {
            self.sentences = self
                .text
                .split(['.', '?', '!'])
                .map(str::to_string)
                .collect();
            self.tokens = self.text.split_whitespace().map(str::to_string).collect();
        }

        for &tag in COUNTED_TAGS {
            self.tag_counts.insert(tag, count_matches(&document, tag));
        }

        if let Ok(selector) = Selector::parse("script") {
            self.script_texts = document
                .select(&selector)
                .map(|script| script.text().collect::<String>())
                .collect();
        }

        self.num_files = FILE_EXTENSIONS
            .iter()
            .map(|ext| count_matches(&document, &format!("a[href$=\"{}\"]", ext)))
            .sum();

        self.content = body.to_string();
    }

    fn tags(&self, selector: &str) -> usize {
        self.tag_counts.get(selector).copied().unwrap_or_default()
    }

    fn text_len(&self) -> usize {
        self.text.chars().count()
    }

    fn num_scripts(&self) -> usize {
        self.script_texts.len()
    }

    fn num_external_scripts(&self) -> usize {
        if self.num_scripts() == 0 {
            0
        } else {
            self.tags("script[src^=http]")
        }
    }

    fn num_inline_scripts(&self) -> usize {
        self.script_texts
            .iter()
            .filter(|s| !s.trim().is_empty())
            .count()
    }
}

fn count_matches(document: &Html, selector: &str) -> usize {
    Selector::parse(selector)
        .map(|s| document.select(&s).count())
        .unwrap_or(0)
}

fn ratio(numerator: usize, denominator: usize) -> FeatureValue {
    if denominator == 0 {
        FeatureValue::Null
    } else {
        FeatureValue::Float(numerator as f64 / denominator as f64)
    }
}

fn text_or_empty(ctx: &PageContext, value: &str) -> FeatureValue {
    if ctx.has_response {
        value.into()
    } else {
        "".into()
    }
}

fn avg_len(items: &[String]) -> FeatureValue {
    let total: usize = items.iter().map(|s| s.chars().count()).sum();
    ratio(total, items.len())
}

const CONTENT_FEATURES: Manifest<PageContext> = &[
    ("ct_has_redirects", |c| (c.num_redirects > 0).into()),
    ("ct_status_code", |c| c.status.into()),
    ("ct_entropy", |c| shannon_entropy(&c.text).into()),
    ("ct_num_redirects", |c| {
        (c.num_redirects > 0).then_some(c.num_redirects).into()
    }),
    ("ct_content_type", |c| text_or_empty(c, &c.content_type)),
    ("ct_connection", |c| text_or_empty(c, &c.connection)),
    ("ct_server", |c| text_or_empty(c, &c.server)),
    ("ct_content_length", |c| c.text_len().into()),
    ("ct_content_to_text_ratio", |c| {
        ratio(c.content.chars().count(), c.text_len())
    }),
    ("ct_num_words", |c| c.tokens.len().into()),
    ("ct_num_sentences", |c| c.sentences.len().into()),
    ("ct_num_paragraphs", |c| {
        if c.text.is_empty() {
            0usize.into()
        } else {
            c.text.split('\n').count().into()
        }
    }),
    ("ct_token_to_text_ratio", |c| ratio(c.tokens.len(), c.text_len())),
    ("ct_sentence_to_text_ratio", |c| ratio(c.sentences.len(), c.text_len())),
    ("ct_token_to_sentence_ratio", |c| ratio(c.tokens.len(), c.sentences.len())),
    ("ct_avg_token_length", |c| avg_len(&c.tokens)),
    ("ct_avg_sentence_length", |c| avg_len(&c.sentences)),
    ("ct_num_script_tags", |c| c.num_scripts().into()),
    ("ct_num_style_tags", |c| c.tags("style").into()),
    ("ct_num_image_tags", |c| c.tags("img").into()),
    ("ct_num_links", |c| c.tags("a").into()),
    ("ct_num_h1_tags", |c| c.tags("h1").into()),
    ("ct_num_h2_tags", |c| c.tags("h2").into()),
    ("ct_num_h3_tags", |c| c.tags("h3").into()),
    ("ct_num_h4_tags", |c| c.tags("h4").into()),
    ("ct_num_h5_tags", |c| c.tags("h5").into()),
    ("ct_num_h6_tags", |c| c.tags("h6").into()),
    ("ct_num_table_tags", |c| c.tags("table").into()),
    ("ct_num_form_tags", |c| c.tags("form").into()),
    ("ct_num_input_tags", |c| c.tags("input").into()),
    ("ct_num_hidden_tags", |c| c.tags("[hidden]").into()),
    ("ct_num_hidden_input", |c| c.tags("input[type=hidden]").into()),
    ("ct_num_external_links", |c| {
        if c.text.is_empty() {
            0usize.into()
        } else {
            c.tags("a[href^=http]").into()
        }
    }),
    ("ct_num_files", |c| c.num_files.into()),
    ("ct_text_entropy", |c| shannon_entropy(&c.text).into()),
    ("ct_num_html_tags", |c| c.tags("*").into()),
    ("ct_num_html_comments", |c| c.num_comments.into()),
    ("ct_num_capitalizations", |c| {
        c.text.chars().filter(|ch| ch.is_uppercase()).count().into()
    }),
    ("ct_num_embeds", |c| c.tags("embed").into()),
    ("ct_num_objects", |c| c.tags("object").into()),
    ("ct_num_iframes", |c| c.tags("iframe").into()),
    ("ct_num_meta_tags", |c| c.tags("meta").into()),
    ("ct_num_title_tags", |c| c.tags("title").into()),
    ("ct_num_head_tags", |c| c.tags("head").into()),
    ("ct_num_body_tags", |c| c.tags("body").into()),
    ("ct_num_html_root_tags", |c| c.tags("html").into()),
    ("ct_script_entropy", |c| shannon_entropy(&c.script_texts.join(" ")).into()),
    ("ct_num_evals", |c| {
        c.script_texts.iter().filter(|s| s.contains("eval")).count().into()
    }),
    ("ct_avg_script_length", |c| {
        if c.num_scripts() == 0 {
            FeatureValue::Float(0.0)
        } else {
            avg_len(&c.script_texts)
        }
    }),
    ("ct_num_external_scripts", |c| c.num_external_scripts().into()),
    ("ct_num_inline_scripts", |c| c.num_inline_scripts().into()),
    ("ct_num_internal_scripts", |c| {
        c.num_scripts()
            .saturating_sub(c.num_external_scripts())
            .saturating_sub(c.num_inline_scripts())
            .into()
    }),
    ("ct_script_to_text_ratio", |c| {
        ratio(c.script_texts.join(" ").chars().count(), c.text_len())
    }),
    ("ct_script_to_sentence_ratio", |c| ratio(c.num_scripts(), c.sentences.len())),
    ("ct_script_to_tag_ratio", |c| ratio(c.num_scripts(), c.tags("*"))),
];

/// Page content feature set
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentFeatures;

#[async_trait]
impl FeatureSet for ContentFeatures {
    fn family(&self) -> FeatureFamily {
        FeatureFamily::Content
    }

    fn names(&self) -> Vec<&'static str> {
        manifest_names(CONTENT_FEATURES)
    }

    async fn extract(&self, resolved: &ResolvedUrl) -> Result<FeatureRecord, FeatureError> {
        let ctx = PageContext::new(resolved);
        Ok(evaluate(FeatureFamily::Content, CONTENT_FEATURES, &ctx))
    }
}
