//! Shader Source Scanner
//!
//! A line-oriented scanner that splits shader source into a typed token
//! stream: plain text, `attribute`/`varying`/`uniform` statements, and
//! resource statements (`var` declarations of textures, samplers, storage
//! textures and storage buffers).
//!
//! # Rules
//!
//! - A statement is recognized only when its keyword is the first
//!   non-whitespace content of a line at module scope (outside braces and
//!   comments). It runs up to the next `;`, which may be on a later line.
//! - Text after the terminating `;` on the same line stays in the source.
//! - [`extract`] removes every statement. The first removed statement marks
//!   the single insertion point for generated code; the rest leave nothing
//!   behind.

use super::error::ShaderProcessError;

/// Statement keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Attribute,
    Varying,
    Uniform,
}

impl DeclarationKind {
    const KEYWORDS: [(&'static str, Self); 3] = [
        ("attribute", Self::Attribute),
        ("varying", Self::Varying),
        ("uniform", Self::Uniform),
    ];
}

/// One element of the scanned source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// Source text passed through unchanged.
    Text(&'a str),
    /// `attribute`/`varying`/`uniform` statement; `body` excludes the keyword
    /// and the `;`.
    Declaration {
        kind: DeclarationKind,
        body: &'a str,
        line: usize,
    },
    /// Resource `var` statement without the terminating `;`.
    Resource { statement: &'a str, line: usize },
}

/// Splits `src` into tokens.
pub fn tokenize(src: &str) -> Result<Vec<Token<'_>>, ShaderProcessError> {
    let mut tokens = Vec::new();
    let mut structure = Structure::default();
    let mut text_start = 0;
    let mut pos = 0;
    let mut line = 1;

    while pos < src.len() {
        let line_end = end_of_line(src, pos);

        if structure.at_top_level()
            && let Some((token, end)) = statement_at(src, pos, line)?
        {
            if text_start < pos {
                tokens.push(Token::Text(&src[text_start..pos]));
            }
            tokens.push(token);
            line += count_newlines(&src[pos..end]);
            text_start = end;

            let rest_end = end_of_line(src, end);
            structure.scan(&src[end..rest_end]);
            line += count_newlines(&src[end..rest_end]);
            pos = rest_end;
            continue;
        }

        structure.scan(&src[pos..line_end]);
        line += count_newlines(&src[pos..line_end]);
        pos = line_end;
    }

    if text_start < src.len() {
        tokens.push(Token::Text(&src[text_start..]));
    }
    Ok(tokens)
}

// ─── Extraction ──────────────────────────────────────────────────────────────

/// A statement body with its source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatement {
    pub text: String,
    pub line: usize,
}

/// A shader stage with all declarations removed.
///
/// Generated code is spliced between `head` and `tail`.
#[derive(Debug, Clone, Default)]
pub struct ExtractedStage {
    pub head: String,
    pub tail: String,
    pub attributes: Vec<RawStatement>,
    pub varyings: Vec<RawStatement>,
    pub uniforms: Vec<RawStatement>,
    pub resources: Vec<RawStatement>,
}

impl ExtractedStage {
    /// Joins the stage back together with `block` at the insertion point.
    #[must_use]
    pub fn assemble(&self, block: &str) -> String {
        let mut out = String::with_capacity(self.head.len() + block.len() + self.tail.len() + 1);
        out.push_str(&self.head);
        out.push_str(block);
        if !block.is_empty() && !block.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&self.tail);
        out
    }

    /// Applies a text rewrite to both halves of the body.
    pub fn rewrite(&mut self, f: impl Fn(&str) -> String) {
        self.head = f(&self.head);
        self.tail = f(&self.tail);
    }

    /// Whether `predicate` holds for either half of the stage body.
    #[must_use]
    pub fn body_contains(&self, mut predicate: impl FnMut(&str) -> bool) -> bool {
        predicate(&self.head) || predicate(&self.tail)
    }
}

/// Scans `src` and separates declarations from the remaining body.
pub fn extract(src: &str) -> Result<ExtractedStage, ShaderProcessError> {
    let mut stage = ExtractedStage::default();
    let mut marked = false;

    for token in tokenize(src)? {
        let target = if marked { &mut stage.tail } else { &mut stage.head };
        match token {
            Token::Text(text) => target.push_str(text),
            Token::Declaration { kind, body, line } => {
                marked = true;
                let statement = RawStatement {
                    text: normalize_whitespace(body),
                    line,
                };
                match kind {
                    DeclarationKind::Attribute => stage.attributes.push(statement),
                    DeclarationKind::Varying => stage.varyings.push(statement),
                    DeclarationKind::Uniform => stage.uniforms.push(statement),
                }
            }
            Token::Resource { statement, line } => {
                marked = true;
                stage.resources.push(RawStatement {
                    text: normalize_whitespace(statement),
                    line,
                });
            }
        }
    }
    Ok(stage)
}

/// Collapses every whitespace run to one space and trims the ends.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ─── Statement Recognition ───────────────────────────────────────────────────

fn statement_at(
    src: &str,
    pos: usize,
    line: usize,
) -> Result<Option<(Token<'_>, usize)>, ShaderProcessError> {
    let line_text = &src[pos..end_of_line(src, pos)];
    let content = line_text.trim_start_matches([' ', '\t']);
    let indent = line_text.len() - content.len();

    for (keyword, kind) in DeclarationKind::KEYWORDS {
        if let Some(after) = content.strip_prefix(keyword)
            && after.starts_with([' ', '\t'])
        {
            let body_start = pos + indent + keyword.len();
            let (semicolon, end) = terminator(src, body_start).ok_or_else(|| {
                ShaderProcessError::InvalidDeclaration {
                    text: line_text.trim().to_string(),
                    line,
                }
            })?;
            let token = Token::Declaration {
                kind,
                body: src[body_start..semicolon].trim(),
                line,
            };
            return Ok(Some((token, end)));
        }
    }

    if let Some(after) = content.strip_prefix("var")
        && after.starts_with(['<', ' ', '\t'])
        && let Some((semicolon, end)) = terminator(src, pos + indent)
    {
        let statement = &src[pos + indent..semicolon];
        if is_resource_statement(statement) {
            return Ok(Some((Token::Resource { statement, line }, end)));
        }
    }

    Ok(None)
}

/// Position of the first `;` at or after `from`, and the end of the `;` run.
fn terminator(src: &str, from: usize) -> Option<(usize, usize)> {
    let semicolon = from + src[from..].find(';')?;
    let run = src[semicolon..].bytes().take_while(|&b| b == b';').count();
    Some((semicolon, semicolon + run))
}

/// Whether a `var ...` statement declares a bindable resource.
fn is_resource_statement(statement: &str) -> bool {
    let rest = statement["var".len()..].trim_start();
    let (address_space, rest) = match rest.strip_prefix('<') {
        Some(inner) => match inner.split_once('>') {
            Some((space, rest)) => (Some(space), rest),
            None => return false,
        },
        None => (None, rest),
    };

    if let Some(space) = address_space {
        return space.split(',').next().map(str::trim) == Some("storage");
    }

    let Some((_, ty)) = rest.split_once(':') else {
        return false;
    };
    let ty = ty.trim_start();
    ty.starts_with("texture_") || ty.starts_with("sampler") || ty.starts_with("array<texture")
}

// ─── Structure Tracking ──────────────────────────────────────────────────────

/// Brace and block-comment nesting, used to restrict recognition to module
/// scope.
#[derive(Debug, Default)]
struct Structure {
    braces: u32,
    comments: u32,
}

impl Structure {
    fn at_top_level(&self) -> bool {
        self.braces == 0 && self.comments == 0
    }

    fn scan(&mut self, text: &str) {
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let next = bytes.get(i + 1).copied();
            if self.comments > 0 {
                match (bytes[i], next) {
                    (b'*', Some(b'/')) => {
                        self.comments -= 1;
                        i += 2;
                        continue;
                    }
                    (b'/', Some(b'*')) => {
                        self.comments += 1;
                        i += 2;
                        continue;
                    }
                    _ => {}
                }
            } else {
                match (bytes[i], next) {
                    (b'/', Some(b'/')) => match text[i..].find('\n') {
                        Some(n) => {
                            i += n;
                            continue;
                        }
                        None => return,
                    },
                    (b'/', Some(b'*')) => {
                        self.comments += 1;
                        i += 2;
                        continue;
                    }
                    (b'{', _) => self.braces += 1,
                    (b'}', _) => self.braces = self.braces.saturating_sub(1),
                    _ => {}
                }
            }
            i += 1;
        }
    }
}

fn end_of_line(src: &str, pos: usize) -> usize {
    src[pos..].find('\n').map_or(src.len(), |i| pos + i + 1)
}

fn count_newlines(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}
