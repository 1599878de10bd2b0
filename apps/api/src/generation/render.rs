//! Stage 4: deterministic HTML scaffold for the final article.
//!
//! The scaffold fixes the document structure (stylesheet, table of contents, anchors,
//! quote blocks, resources and call to action). The model only fills the bracketed
//! writing instructions with prose.

use std::fmt::Write;

use crate::generation::prompts::{fill_template, RENDER_PREAMBLE_TEMPLATE};
use crate::generation::stages::{ArticleOutline, ExpertInsights, KeywordPlan};
use crate::llm_client::prompts::{EXPERT_PERSONA, ROMANIAN_OUTPUT_INSTRUCTION};

pub const CTA_URL: &str = "/contact";

const STYLESHEET: &str = r#"
    body { font-family: 'Arial', sans-serif; line-height: 1.7; color: #333; max-width: 800px; margin: 0 auto; padding: 20px; }
    h1, h2, h3 { font-weight: bold; color: #2c3e50; margin-top: 2em; margin-bottom: 0.8em; line-height: 1.2; }
    h1 { font-size: 2.2em; text-align: center; }
    h2 { font-size: 1.8em; color: #3498db; }
    h3 { font-size: 1.4em; }
    p { margin-bottom: 1em; text-align: justify; }
    ul, ol { margin-bottom: 1em; padding-left: 25px; }
    li { margin-bottom: 0.5em; }
    blockquote { border-left: 4px solid #ccc; padding-left: 15px; margin: 1.5em 0; font-style: italic; color: #555; }
    a { color: #3498db; text-decoration: none; }
    a:hover { text-decoration: underline; }
    .table-of-contents { background-color: #f9f9f9; padding: 15px; border-radius: 8px; border: 1px solid #eee; margin-bottom: 30px; }
    .table-of-contents ul { list-style-type: none; padding-left: 0; }
    .table-of-contents ul ul { padding-left: 20px; font-size: 0.95em; }
    .table-of-contents a { font-weight: bold; }
    .highlight-box { background-color: #e6f7ff; border-left: 4px solid #3498db; padding: 15px; margin: 20px 0; border-radius: 4px; }
    .highlight-box p { margin: 0; font-style: italic; }
    .cta-block { background-color: #d4edda; color: #155724; padding: 25px; text-align: center; border-radius: 8px; margin-top: 40px; border: 1px solid #c3e6cb; }
    .cta-block h2 { color: #155724; margin-top: 0; }
    .cta-block a { background-color: #28a745; color: white; padding: 12px 25px; border-radius: 5px; display: inline-block; font-weight: bold; }
    @media (max-width: 768px) {
        body { padding: 10px; }
        h1 { font-size: 1.8em; }
        h2 { font-size: 1.5em; }
        h3 { font-size: 1.2em; }
    }
"#;

/// Resources listed in every article, before the model-suggested ones.
const FIXED_RESOURCES: &[(&str, &str, &str)] = &[
    (
        "Informații validate despre sănătatea mintală",
        "https://www.who.int/health-topics/mental-health",
        "Organizația Mondială a Sănătății (OMS)",
    ),
    (
        "Psihoterapeuți acreditați",
        "https://www.copsi.ro",
        "Colegiul Psihologilor din România",
    ),
    (
        "Studii științifice",
        "https://scholar.google.com/",
        "Google Scholar",
    ),
    (
        "Publicații de specialitate",
        "https://pubmed.ncbi.nlm.nih.gov/",
        "PubMed",
    ),
];

/// Anchor id of the i-th H2 section (1-based).
pub fn section_anchor(section: usize) -> String {
    format!("section-{section}")
}

/// Anchor id of the j-th H3 inside the i-th H2 section (both 1-based).
pub fn subsection_anchor(section: usize, subsection: usize) -> String {
    format!("section-{section}-{subsection}")
}

/// Escapes text for use in element content and double-quoted attributes.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Builds the full article scaffold from the validated outputs of stages 1-3.
pub fn render_scaffold(
    plan: &KeywordPlan,
    outline: &ArticleOutline,
    insights: &ExpertInsights,
) -> String {
    let subject = escape_html(&plan.final_subject);
    let mut html = String::with_capacity(8 * 1024);

    // `write!` into a String cannot fail.
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html lang=\"ro\">\n<head>\n\
         <meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <title>{}</title>\n\
         <meta name=\"description\" content=\"{}\">\n\
         <style>{STYLESHEET}</style>\n</head>\n<body>\n",
        escape_html(&outline.proposed_title),
        escape_html(&outline.proposed_description),
    );

    render_table_of_contents(&mut html, outline);

    let _ = write!(
        html,
        "<h1>{subject}</h1>\n\
         <p><strong>Introducere:</strong> [WRITE: a captivating 2-3 paragraph introduction \
         explaining what \"{subject}\" is, why it matters to the reader and what they will learn. \
         Weave in the primary keyword \"{}\" naturally. Warm, empathetic, professional tone.]</p>\n",
        escape_html(&plan.primary_keyword),
    );

    render_sections(&mut html, plan, outline);
    render_expert_perspectives(&mut html, &subject, insights);
    render_resources(&mut html, insights);

    let _ = write!(
        html,
        "<h2>Concluzie: O călătorie spre binele tău</h2>\n\
         <p>[WRITE: summarise the main benefits of managing {subject} and encourage the reader \
         to take concrete steps. Stress the value of professional support and perseverance.]</p>\n\
         <p>[WRITE: close with a strong, positive message that invites the reader to act and \
         take ownership of their wellbeing.]</p>\n\
         <div class=\"cta-block\">\n\
         <h2>Ești pregătit să faci primul pas?</h2>\n\
         <p>Dacă acest articol a rezonat cu tine și ai nevoie de sprijin specializat, nu ești singur/ă. \
         Este un act de curaj să ceri ajutor.</p>\n\
         <a href=\"{CTA_URL}\">Programează o ședință acum!</a>\n\
         </div>\n</body>\n</html>\n"
    );

    html
}

fn render_table_of_contents(html: &mut String, outline: &ArticleOutline) {
    html.push_str("<div class=\"table-of-contents\">\n<h2>Cuprins:</h2>\n<ul>\n");
    for (i, section) in outline.sections.iter().enumerate() {
        let _ = write!(
            html,
            "<li><a href=\"#{}\">{}</a>",
            section_anchor(i + 1),
            escape_html(&section.heading)
        );
        if !section.subheadings.is_empty() {
            html.push_str("<ul>");
            for (j, sub) in section.subheadings.iter().enumerate() {
                let _ = write!(
                    html,
                    "<li><a href=\"#{}\">{}</a></li>",
                    subsection_anchor(i + 1, j + 1),
                    escape_html(sub)
                );
            }
            html.push_str("</ul>");
        }
        html.push_str("</li>\n");
    }
    html.push_str("</ul>\n</div>\n");
}

fn render_sections(html: &mut String, plan: &KeywordPlan, outline: &ArticleOutline) {
    let secondary = escape_html(&plan.secondary_keywords.join(", "));

    for (i, section) in outline.sections.iter().enumerate() {
        let _ = write!(
            html,
            "<h2 id=\"{}\">{}</h2>\n\
             <p>[WRITE: 1-3 essential, concise paragraphs with practical, scientifically grounded \
             information. Weave in the relevant secondary keywords: {secondary}. Add a bulleted or \
             numbered list where it helps.]</p>\n",
            section_anchor(i + 1),
            escape_html(&section.heading)
        );

        for (j, sub) in section.subheadings.iter().enumerate() {
            let sub = escape_html(sub);
            let _ = write!(
                html,
                "<h3 id=\"{}\">{sub}</h3>\n\
                 <p>[WRITE: 1-2 clear, concise paragraphs with specific details and practical \
                 examples for \"{sub}\". Weave in long-tail keywords naturally.]</p>\n",
                subsection_anchor(i + 1, j + 1)
            );
            if j == 0 {
                html.push_str(
                    "<div class=\"highlight-box\">\n\
                     <p><strong>💡 Sfat util:</strong> [WRITE: one specific, actionable tip tied \
                     to this sub-topic.]</p>\n</div>\n",
                );
            }
        }
    }
}

fn render_expert_perspectives(html: &mut String, subject: &str, insights: &ExpertInsights) {
    let _ = write!(
        html,
        "<h2>Perspective din psihoterapie: ce spun experții</h2>\n\
         <p>[WRITE: one sentence introducing how psychotherapy research helps us understand \
         {subject}.]</p>\n"
    );

    for concept in &insights.author_concepts {
        let _ = write!(
            html,
            "<blockquote>\n<p><strong>{}</strong> ({}): \"{}\"</p>\n</blockquote>\n",
            escape_html(&concept.author),
            escape_html(&concept.concept),
            escape_html(&concept.quote_or_idea)
        );
    }

    if !insights.statistic_ideas.is_empty() {
        let _ = write!(
            html,
            "<p>[WRITE: a paragraph on why these statistic themes matter, without inventing \
             exact figures: {}.]</p>\n",
            escape_html(&insights.statistic_ideas.join("; "))
        );
    }
}

fn render_resources(html: &mut String, insights: &ExpertInsights) {
    html.push_str("<h2>Resurse suplimentare</h2>\n<ul>\n");
    for (label, url, name) in FIXED_RESOURCES {
        let _ = writeln!(
            html,
            "<li>{label}: <a href=\"{url}\" rel=\"nofollow\">{name}</a></li>"
        );
    }
    for source in &insights.external_sources {
        let _ = writeln!(html, "<li>{}</li>", escape_html(source));
    }
    html.push_str("</ul>\n");
}

/// Full Stage 4 prompt: writing instructions followed by the scaffold.
pub fn render_prompt(
    plan: &KeywordPlan,
    outline: &ArticleOutline,
    insights: &ExpertInsights,
) -> String {
    let preamble = fill_template(
        RENDER_PREAMBLE_TEMPLATE,
        &[
            ("persona", EXPERT_PERSONA),
            ("final_subject", &plan.final_subject),
            ("language", ROMANIAN_OUTPUT_INSTRUCTION),
        ],
    );

    format!("{preamble}{}", render_scaffold(plan, outline, insights))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use scraper::{Html, Selector};

    use super::*;
    use crate::generation::stages::{AuthorConcept, OutlineSection};

    fn fixtures() -> (KeywordPlan, ArticleOutline, ExpertInsights) {
        let plan = KeywordPlan {
            final_subject: "Stresul la locul de muncă".to_string(),
            primary_keyword: "stres la locul de muncă".to_string(),
            secondary_keywords: vec!["burnout".to_string()],
            long_tail_keywords: vec![],
            rationale: String::new(),
        };
        let outline = ArticleOutline {
            sections: vec![
                OutlineSection {
                    heading: "Ce este stresul ocupațional".to_string(),
                    subheadings: vec!["Semne".to_string(), "Cauze".to_string()],
                },
                OutlineSection {
                    heading: "Strategii <practice>".to_string(),
                    subheadings: vec![],
                },
            ],
            unique_angle: String::new(),
            proposed_title: "Stresul la muncă".to_string(),
            proposed_description: "Ghid \"practic\"".to_string(),
        };
        let insights = ExpertInsights {
            author_concepts: vec![AuthorConcept {
                author: "Aaron Beck".to_string(),
                concept: "Distorsiuni cognitive".to_string(),
                quote_or_idea: "Gândurile modelează emoțiile".to_string(),
            }],
            statistic_ideas: vec!["prevalența burnout-ului".to_string()],
            external_sources: vec!["Asociația Psihologilor".to_string()],
        };
        (plan, outline, insights)
    }

    #[test]
    fn test_anchor_format() {
        assert_eq!(section_anchor(3), "section-3");
        assert_eq!(subsection_anchor(3, 2), "section-3-2");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_scaffold_anchors_are_unique_and_linked_from_toc() {
        let (plan, outline, insights) = fixtures();
        let document = Html::parse_document(&render_scaffold(&plan, &outline, &insights));

        let ids: Vec<String> = document
            .select(&Selector::parse("h2[id], h3[id]").unwrap())
            .filter_map(|el| el.value().attr("id").map(str::to_string))
            .collect();
        assert_eq!(ids, vec!["section-1", "section-1-1", "section-1-2", "section-2"]);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());

        let links: Vec<String> = document
            .select(&Selector::parse(".table-of-contents a").unwrap())
            .filter_map(|el| el.value().attr("href").map(str::to_string))
            .collect();
        let expected: Vec<String> = ids.iter().map(|id| format!("#{id}")).collect();
        assert_eq!(links, expected);
    }

    #[test]
    fn test_scaffold_escapes_model_text() {
        let (plan, outline, insights) = fixtures();
        let html = render_scaffold(&plan, &outline, &insights);
        assert!(html.contains("Strategii &lt;practice&gt;"));
        assert!(html.contains("content=\"Ghid &quot;practic&quot;\""));
    }

    #[test]
    fn test_scaffold_contains_quotes_resources_and_cta() {
        let (plan, outline, insights) = fixtures();
        let html = render_scaffold(&plan, &outline, &insights);
        assert!(html.contains("<strong>Aaron Beck</strong> (Distorsiuni cognitive)"));
        assert!(html.contains("https://pubmed.ncbi.nlm.nih.gov/"));
        assert!(html.contains("<li>Asociația Psihologilor</li>"));
        assert!(html.contains("class=\"cta-block\""));
        assert_eq!(html.matches("class=\"highlight-box\"").count(), 1);
    }

    #[test]
    fn test_prompt_ends_with_scaffold() {
        let (plan, outline, insights) = fixtures();
        let prompt = render_prompt(&plan, &outline, &insights);
        assert!(prompt.contains("Stresul la locul de muncă"));
        assert!(prompt.ends_with(&render_scaffold(&plan, &outline, &insights)));
    }
}
