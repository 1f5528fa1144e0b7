use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use crossterm::event::Event;
use crossterm::event::KeyCode;
use crossterm::event::KeyEventKind;
use crossterm::terminal::EnterAlternateScreen;
use crossterm::terminal::LeaveAlternateScreen;
use crossterm::terminal::disable_raw_mode;
use crossterm::terminal::enable_raw_mode;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Constraint;
use ratatui::layout::Direction;
use ratatui::layout::Layout;
use ratatui::text::Line;
use ratatui::text::Span;
use ratatui::widgets::Paragraph;
use ratatui_mdflow::MarkdownConfig;
use ratatui_mdflow::MarkdownSession;
use ratatui_mdflow::MarkdownStreamView;
use ratatui_mdflow::MarkdownView;
use ratatui_mdflow::karaoke::KaraokeClock;
use ratatui_mdflow_core::theme::Theme;
use ratatui_mdflow_syntax::default_highlighter;

const FRAME: Duration = Duration::from_millis(33);
const WORD_MS: u64 = 180;

struct App {
    session: Arc<MarkdownSession>,
    view: MarkdownStreamView,
    clock: KaraokeClock,
    started: Instant,
}

fn main() -> io::Result<()> {
    if std::env::args().any(|a| a == "-h" || a == "--help") {
        eprintln!("Usage: cargo run -p ratatui-mdflow --example stream [-- config.toml]");
        return Ok(());
    }
    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .init();
    }

    let config = match std::env::args().nth(1) {
        Some(path) => MarkdownConfig::from_path(&path)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?,
        None => MarkdownConfig::default(),
    };

    let session = MarkdownSession::new();
    let mut view = MarkdownView::from_config(&config);
    view.set_highlighter(Some(default_highlighter()));
    let mut stream = MarkdownStreamView::with_view(Arc::clone(&session), view);
    stream.set_follow_tail(config.view.follow_tail);

    let demo = demo_markdown();
    let clock = KaraokeClock::new(Arc::clone(&session), word_timestamps(&demo));
    spawn_producer(Arc::clone(&session), demo);

    let mut stdout = io::stdout();
    enable_raw_mode()?;
    crossterm::execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App {
        session,
        view: stream,
        clock,
        started: Instant::now(),
    };
    let res = run(&mut terminal, &Theme::default(), &mut app);

    disable_raw_mode()?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    app.session.close();
    res
}

fn spawn_producer(session: Arc<MarkdownSession>, demo: String) {
    thread::spawn(move || {
        let chars: Vec<char> = demo.chars().collect();
        for chunk in chars.chunks(4) {
            if session.is_closed() {
                return;
            }
            session.append(&chunk.iter().collect::<String>());
            thread::sleep(Duration::from_millis(12));
        }
    });
}

fn run<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    theme: &Theme,
    app: &mut App,
) -> io::Result<()> {
    loop {
        let now = Instant::now();
        if app.clock.is_playing() {
            let elapsed = now.duration_since(app.started).as_millis();
            app.clock.sync(u64::try_from(elapsed).unwrap_or(u64::MAX));
        }

        terminal.draw(|f| ui(f, theme, app, now))?;

        let timeout = app
            .view
            .next_redraw_deadline()
            .map_or(FRAME, |d| d.saturating_duration_since(Instant::now()).min(FRAME));
        if crossterm::event::poll(timeout)?
            && let Event::Key(key) = crossterm::event::read()?
        {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') => return Ok(()),
                KeyCode::Char('f') => {
                    let follow = !app.view.follow_tail();
                    app.view.set_follow_tail(follow);
                    if follow {
                        app.view.view_mut().scroll_to_bottom();
                    }
                }
                KeyCode::Char('p') => {
                    let playing = !app.clock.is_playing();
                    if playing {
                        app.started = Instant::now();
                    } else {
                        app.clock.reset();
                    }
                    app.clock.set_playing(playing);
                }
                KeyCode::Char('j') | KeyCode::Down => app.view.view_mut().scroll_y_by(1),
                KeyCode::Char('k') | KeyCode::Up => app.view.view_mut().scroll_y_by(-1),
                KeyCode::Char('l') | KeyCode::Right => app.view.view_mut().scroll_x_by(4),
                KeyCode::Char('h') | KeyCode::Left => app.view.view_mut().scroll_x_by(-4),
                KeyCode::PageDown => app.view.view_mut().state.page_down(),
                KeyCode::PageUp => app.view.view_mut().state.page_up(),
                KeyCode::Char('g') | KeyCode::Home => app.view.view_mut().state.to_top(),
                KeyCode::Char('G') | KeyCode::End => app.view.view_mut().scroll_to_bottom(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut ratatui::Frame<'_>, theme: &Theme, app: &mut App, now: Instant) {
    let area = f.area();
    let [main, status_area] = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .areas(area);

    app.view.render_ref_at(main, f.buffer_mut(), theme, now);

    let status = Line::from(vec![
        Span::styled(
            format!(
                " v{} | {} bytes | word {} ",
                app.session.version(),
                app.session.get_all_text().len(),
                app.session.highlight_position()
            ),
            theme.text_muted,
        ),
        Span::styled(
            format!(
                "| follow:{} karaoke:{} ",
                if app.view.follow_tail() { "on" } else { "off" },
                if app.clock.is_playing() { "on" } else { "off" }
            ),
            theme.accent,
        ),
        Span::styled("| q quit, j/k scroll, f follow, p karaoke", theme.text_muted),
    ]);
    f.render_widget(Paragraph::new(status), status_area);
}

fn word_timestamps(text: &str) -> BTreeMap<usize, u64> {
    (0..text.split_whitespace().count())
        .map(|i| (i, i as u64 * WORD_MS))
        .collect()
}

fn demo_markdown() -> String {
    r#"# Streaming Markdown

Text arrives a few characters at a time and is **re-parsed in full** on every draw, so
*half-open* emphasis settles as soon as its closing marker lands.

## A table

Columns are sized once every cell has been measured, then never move again.

| crate | role | notes |
|:------|:----:|------:|
| ratatui | drawing | buffers and spans |
| pulldown-cmark | parsing | CommonMark events |
| syntect | highlighting | optional |

## Math and code

Inline math like $E = mc^2$ keeps its run on one row.

$$
\int_0^1 x^2 \, dx = \frac{1}{3}
$$

```rust
fn main() {
    println!("hello from a fenced block");
}
```

- [x] stream text
- [x] commit table widths
- [ ] press `p` for karaoke

> Quoted text keeps its bar
> across wrapped lines.
"#
    .to_string()
}
