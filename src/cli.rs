use crate::config::{Config, load_config};
use crate::ir::Graph;
use crate::layout::{ElkProcessEngine, LaidOutGraph, LayeredEngine, LayoutEngine, LayoutSession};
use crate::parser::parse_dsl_with_diagnostics;
use crate::render::{render_svg, write_output_png};
use crate::{OutputFormat, render_text};
use anyhow::Result;
use clap::Parser;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "crmviz",
    version,
    about = "Lay out a node/edge DSL and export it as drawio, SVG, PNG, DOT or JSON"
)]
pub struct Args {
    /// Input DSL file or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file. Defaults to stdout for text formats.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "outputFormat", value_enum, default_value = "drawio")]
    pub output_format: OutputFormat,

    /// Config JSON file
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// External ELK layout program (reads ELK JSON on stdin, writes the result on stdout)
    #[arg(long = "engine-command")]
    pub engine_command: Option<String>,

    /// Argument passed to the external layout program (repeatable)
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    pub engine_args: Vec<String>,

    /// Use the built-in width heuristic instead of system fonts
    #[arg(long = "fast-metrics")]
    pub fast_metrics: bool,

    /// Fail on lines that are neither a node nor an edge
    #[arg(long = "strict")]
    pub strict: bool,

    /// Debug logging on stderr
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = load_config(args.config.as_deref())?;
    if args.fast_metrics {
        config.layout.fast_text_metrics = true;
    }

    let input = read_input(args.input.as_deref())?;
    let graph = parse_input(&input, args.strict)?;
    tracing::info!(
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        "parsed diagram"
    );

    if !args.output_format.needs_layout() {
        let text = render_text(&graph, &LaidOutGraph::default(), args.output_format, &config)?;
        return write_text(&text, args.output.as_deref());
    }

    let layout = match &args.engine_command {
        Some(program) => {
            let engine = ElkProcessEngine::new(program.clone()).with_args(args.engine_args.clone());
            lay_out(&graph, &config, engine)?
        }
        None => lay_out(&graph, &config, LayeredEngine::new())?,
    };

    match args.output_format {
        OutputFormat::Png => {
            let output = ensure_output(&args.output, "png")?;
            let svg = render_svg(&layout, &config.theme, &config.layout);
            write_output_png(&svg, &output, &config.render, &config.theme)?;
        }
        format => {
            let text = render_text(&graph, &layout, format, &config)?;
            write_text(&text, args.output.as_deref())?;
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn parse_input(input: &str, strict: bool) -> Result<Graph> {
    let (graph, diagnostics) = parse_dsl_with_diagnostics(input);
    for diagnostic in &diagnostics {
        tracing::debug!(line = diagnostic.line, text = %diagnostic.text, "skipping line");
    }
    if strict && !diagnostics.is_empty() {
        let lines: Vec<String> = diagnostics.iter().map(ToString::to_string).collect();
        anyhow::bail!("{} unrecognized line(s):\n{}", lines.len(), lines.join("\n"));
    }
    Ok(graph)
}

fn lay_out<E: LayoutEngine>(graph: &Graph, config: &Config, engine: E) -> Result<LaidOutGraph> {
    let mut session = LayoutSession::new(engine, config.layout.clone());
    let layout = futures::executor::block_on(session.layout(graph))?;
    tracing::info!(
        width = layout.width,
        height = layout.height,
        "layout finished"
    );
    Ok(layout)
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path {
        if path != Path::new("-") {
            return Ok(std::fs::read_to_string(path)?);
        }
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn write_text(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, text)?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn ensure_output(output: &Option<PathBuf>, ext: &str) -> Result<PathBuf> {
    if let Some(path) = output {
        return Ok(path.clone());
    }
    Err(anyhow::anyhow!("Output path required for {} output", ext))
}
