// All LLM prompt templates for the Generation module.
// Reuses cross-cutting fragments from llm_client::prompts.
// Placeholders are `{name}` and are filled in one pass by `fill_template`.

/// Substitutes `{name}` placeholders in a single left-to-right pass.
///
/// Substituted values are never rescanned, so user text containing `{document}` or
/// `{json_only}` stays literal. Braces that do not name a known placeholder (the JSON
/// schemas in the templates) are copied unchanged.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let candidate = &rest[open + 1..];
        let value = candidate.find('}').and_then(|close| {
            let name = &candidate[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });

        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &candidate[close + 1..];
            }
            None => {
                out.push('{');
                rest = candidate;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Stage 1: topic refinement and keyword research.
/// Replace: {persona}, {subject}, {language}, {json_only}
pub const KEYWORD_RESEARCH_TEMPLATE: &str = r#"{persona}

Generate 3 detailed, SEO-optimised blog article ideas that build directly and specifically on the subject "{subject}". Do NOT change the main subject, only make it more precise.
For each idea propose:
- one relevant primary keyword with a decent search volume
- 5-7 secondary / LSI keywords (variations, synonyms, semantically related terms)
- 10 long-tail keywords that match a clear search intent (informational, commercial or navigational)

Pick the best idea and keyword set, justify the choice, and return ONLY the chosen one with this EXACT schema:
{
  "finalSubject": "...",
  "primaryKeyword": "...",
  "secondaryKeywords": ["...", "..."],
  "longTailKeywords": ["...", "..."],
  "rationale": "..."
}

{language}
{json_only}"#;

/// Stage 2: competitive analysis and outline.
/// Replace: {persona}, {final_subject}, {keywords}, {language}, {json_only}
pub const OUTLINE_TEMPLATE: &str = r#"{persona}

For the subject "{final_subject}" and the relevant keywords "{keywords}", simulate an analysis of the competing Google results.
Identify 3-5 essential sub-topics or frequently asked questions that competitors cover (or cover poorly) and propose a unique angle or content gap our article can exploit.
Structure the article into logical sections (H2) and sub-sections (H3) for a piece of roughly 1200 words.
Propose a concise meta title (50-60 characters) that includes the primary keyword and is compelling.
Propose a succinct meta description (150-160 characters) of the page content.

Return this EXACT schema:
{
  "sections": [{"heading": "...", "subheadings": ["...", "..."]}],
  "uniqueAngle": "...",
  "proposedTitle": "...",
  "proposedDescription": "..."
}

{language}
{json_only}"#;

/// Stage 3: expert concepts, statistic themes and authoritative sources.
/// Replace: {persona}, {final_subject}, {outline_json}, {language}, {json_only}
pub const ENRICHMENT_TEMPLATE: &str = r#"{persona}

For the article on "{final_subject}" with the structure {outline_json}, identify 3-5 key concepts from renowned psychotherapy authors (e.g. Sigmund Freud, Carl Jung, Carl Rogers, Aaron Beck, Irvin Yalom, Viktor Frankl) that are relevant to the sub-topics.
For every concept propose a short representative quote or main idea that can be woven into the article.
Also include 2-3 relevant statistic themes (the theme only, NEVER exact figures) and 2-3 suggestions of authoritative external sources (an institution or a publication name).

Return this EXACT schema:
{
  "authorConcepts": [{"author": "...", "concept": "...", "quoteOrIdea": "..."}],
  "statisticIdeas": ["...", "..."],
  "externalSources": ["...", "..."]
}

{language}
{json_only}"#;

/// Stage 4: preamble placed before the rendered HTML scaffold.
/// Replace: {persona}, {final_subject}, {language}
pub const RENDER_PREAMBLE_TEMPLATE: &str = r#"{persona}

Write a complete blog article of at least 1200 and at most 1500 words on the subject "{final_subject}".
THE OUTPUT MUST BE ONLY VALID, CLEAN HTML, READY TO PASTE INTO A WEBSITE, WITH NO TEXT OR MARKDOWN OUTSIDE THE HTML.
Use the document below as the exact skeleton: keep every heading, id, anchor, class and link as given, and replace each bracketed [WRITE: ...] instruction with the finished prose it asks for.

{language}

"#;

/// Stage 5: SEO and UX scoring of the rendered document.
/// Replace: {keywords}, {document}, {json_only}
pub const SEO_SCORING_TEMPLATE: &str = r#"Evaluate the following HTML article for SEO and UX quality.

CRITERIA:
1. Keywords: density and distribution for "{keywords}"
2. HTML structure: the H1 > H2 > H3 hierarchy and its semantics
3. Content quality: originality, value, coherence
4. Metadata: title and meta description
5. UX: readability, structure, calls to action

Return this EXACT schema (scores are integers from 0 to 100):
{
  "overallScore": 85,
  "detailedAnalysis": {
    "keywords": {"score": 90, "comments": "..."},
    "htmlStructure": {"score": 80, "comments": "..."},
    "contentQuality": {"score": 85, "comments": "..."},
    "metadata": {"score": 75, "comments": "..."},
    "uxReadability": {"score": 90, "comments": "..."}
  },
  "priorityRecommendations": ["...", "...", "..."],
  "status": "Good"
}

{json_only}

HTML article:
{document}..."#;

/// Summary of an existing article.
/// Replace: {document}, {language}
pub const SUMMARY_TEMPLATE: &str = r#"You are an expert at summarising texts. Write a concise, informative summary (at most 200 words) of the following HTML content.
The summary must capture the main ideas and must NOT contain any HTML tags or markdown.
{language}

HTML article:
{document}..."#;

/// Expansion of one section of an existing article.
/// Replace: {persona}, {section_title}, {document}, {language}
pub const EXPAND_SECTION_TEMPLATE: &str = r#"{persona}

Expand the section "{section_title}" of the following HTML article. Add at least 300 words of new, detailed content with practical examples and relevant information, keeping the tone and style of the original.
Return ONLY the expanded HTML content for that section (no <html>, <head> or <body> tags). Use paragraphs (<p>), lists (<ul><li>, <ol><li>) and bold text (<strong>) for readability.
{language}

HTML article:
{document}..."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_template_replaces_known_placeholders_only() {
        let filled = fill_template(
            "Hello {name}! Schema: {\"a\": 1} {unknown}",
            &[("name", "Ana")],
        );
        assert_eq!(filled, "Hello Ana! Schema: {\"a\": 1} {unknown}");
    }

    #[test]
    fn test_user_text_is_not_expanded_again() {
        let filled = fill_template(
            "Subject: {subject}\n{json_only}",
            &[("subject", "stres {json_only} {document}"), ("json_only", "JSON ONLY")],
        );
        assert_eq!(filled, "Subject: stres {json_only} {document}\nJSON ONLY");
    }

    #[test]
    fn test_fill_template_handles_unclosed_brace() {
        assert_eq!(fill_template("a { b {x", &[("x", "y")]), "a { b {x");
    }
}
