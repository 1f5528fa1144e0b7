use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use pretty_assertions::assert_eq;
use ratatui::text::Line;
use ratatui_mdflow::Element;
use ratatui_mdflow::MarkdownRenderer;
use ratatui_mdflow::MarkdownSession;
use ratatui_mdflow::MarkdownStreamView;
use ratatui_mdflow::MarkdownView;
use ratatui_mdflow::MarkdownViewOptions;
use ratatui_mdflow::NodeType;
use ratatui_mdflow::Overrides;
use ratatui_mdflow::Parser;
use ratatui_mdflow::PulldownParser;
use ratatui_mdflow::element::SpanKind;
use ratatui_mdflow::table::TableSizing;
use ratatui_mdflow_core::render::join_spans_plain;
use ratatui_mdflow_core::theme::Theme;

fn plain(lines: &[Line<'static>]) -> Vec<String> {
    lines.iter().map(|l| join_spans_plain(&l.spans)).collect()
}

fn paragraph_children(doc: &Element) -> &[Element] {
    let Element::Document(blocks) = doc else {
        panic!("expected a document, got {doc:?}");
    };
    let Element::Paragraph { children, .. } = &blocks[0] else {
        panic!("expected a paragraph, got {:?}", blocks[0]);
    };
    children
}

#[test]
fn styled_inline_run_becomes_one_text_flow() {
    let doc = MarkdownRenderer::default().render_source("**bold** and *italic*");
    let children = paragraph_children(&doc);
    assert_eq!(children.len(), 1);
    let Element::TextFlow(members) = &children[0] else {
        panic!("expected a text flow, got {:?}", children[0]);
    };
    let kinds: Vec<Option<SpanKind>> = members
        .iter()
        .map(|m| match m {
            Element::Span { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        kinds,
        vec![Some(SpanKind::Bold), None, Some(SpanKind::Italic)]
    );
}

#[test]
fn inline_math_turns_the_run_into_a_row() {
    let doc = MarkdownRenderer::default().render_source("energy $E = mc^2$ holds");
    let children = paragraph_children(&doc);
    let Element::Row(members) = &children[0] else {
        panic!("expected a row, got {:?}", children[0]);
    };
    assert!(members.contains(&Element::MathInline("E = mc^2".into())));
}

#[test]
fn parsed_table_lays_out_with_committed_widths() {
    let mut view = MarkdownView::new();
    view.set_markdown("# Scores\n\n| name | pts |\n|:-----|----:|\n| ada | 10 |\n| bob | 7 |\n");
    let lines = plain(&view.lines_for_width(60, &Theme::default()));
    assert_eq!(
        lines,
        vec![
            "Scores",
            "",
            "┌──────┬─────┐",
            "│ name │ pts │",
            "├──────┼─────┤",
            "│ ada  │  10 │",
            "│ bob  │   7 │",
            "└──────┴─────┘",
        ]
    );
}

#[test]
fn reference_sizing_commits_the_documented_widths() {
    let mut view = MarkdownView::with_options(MarkdownViewOptions {
        table: TableSizing::reference(),
        ..Default::default()
    });
    view.set_markdown("| a | b |\n|---|---|\n| c | d |\n");
    let lines = view.lines_for_width_at(400, &Theme::default(), Instant::now());
    let layout = view.tables().get(0).expect("table registered");
    assert_eq!(layout.column_widths(), Some(&[100, 100][..]));
    assert_eq!(join_spans_plain(&lines[0].spans).chars().count(), 203);
}

#[test]
fn streamed_document_settles_to_full_parse() {
    let chunks = ["# Ti", "tle\n\nSome **bo", "ld** text\n\n| x | y |\n", "|---|---|\n| 1 | 2 |\n"];
    let session = MarkdownSession::new();
    let mut stream = MarkdownStreamView::new(Arc::clone(&session));
    let theme = Theme::default();
    for chunk in chunks {
        session.append(chunk);
        stream.lines_for_width(40, &theme);
    }

    let mut oneshot = MarkdownView::new();
    oneshot.set_markdown(&chunks.concat());
    assert_eq!(
        plain(&stream.lines_for_width(40, &theme)),
        plain(&oneshot.lines_for_width(40, &theme))
    );
}

#[test]
fn overrides_see_reconciled_children() {
    let overrides = Overrides::new().with(NodeType::Link, |props| {
        let label: String = props.children.iter().map(Element::plain_text).collect();
        Some(Element::text(format!("<{label}>")))
    });
    let renderer = MarkdownRenderer::default().with_overrides(overrides);
    let doc = renderer.render_source("see [the *docs*](https://example.com) now");
    let children = paragraph_children(&doc);
    let Element::TextFlow(members) = &children[0] else {
        panic!("expected a text flow, got {:?}", children[0]);
    };
    assert_eq!(members[1], Element::text("<the docs>"));
}

#[test]
fn wire_format_round_trips_through_json() {
    let doc = PulldownParser::new()
        .parse("| a |\n|:-:|\n| 1 |\n\n- [x] done\n")
        .unwrap();
    let json = doc.to_json();
    assert!(json.contains("\"isHeader\":true"));
    assert!(json.contains("\"type\":\"task_list_item\""));
    let back = ratatui_mdflow::MarkdownNode::from_json(&json).unwrap();
    assert_eq!(back, doc);
}

#[test]
fn complete_table_commits_without_waiting_for_fallback() {
    let mut view = MarkdownView::with_options(MarkdownViewOptions {
        table: TableSizing {
            fallback_delay: Duration::from_millis(50),
            ..TableSizing::default()
        },
        ..Default::default()
    });
    view.set_markdown("| a | b |\n|---|---|\n| 1 | 2 |\n");
    let start = Instant::now();
    let lines = plain(&view.lines_for_width_at(40, &Theme::default(), start));
    assert!(lines[0].starts_with('┌'));
    assert_eq!(view.next_redraw_deadline(), None);
}
