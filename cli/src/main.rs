use std::env;
use std::io;
use std::io::Write;
use std::process;

use featchart::{
  bottom_up_strategy, default_strategy, left_corner_strategy, ChartRule, EarleyParser, Err, Grammar,
  ParserOptions,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn usage(prog_name: &str) -> String {
  format!(
    r"Usage: {} FILE [options]

Reads sentences from stdin, one per line, and prints their parses.

Options:
  -h, --help          Print this message
  -c, --chart         Print the parse chart (defaults to not printing)
  -n, --no-fs         Don't print feature structures (defaults to printing)
  -s, --subsume       Drop chart edges that a more general edge covers
  -l, --limit N       Give up on a sentence after N parser steps
  --strategy NAME     earley (default), bottom-up or left-corner
  -t, --trace         Log every edge added to the chart (same as RUST_LOG=featchart=trace)",
    prog_name
  )
}

fn init_subscriber(trace: bool) {
  let filter = if trace {
    EnvFilter::new("featchart=trace")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(io::stderr).with_target(false))
    .with(filter)
    .try_init()
    .ok();
}

fn parse(parser: &EarleyParser<'_>, sentence: &str, opts: &Args) -> Result<(), Err> {
  let sentence = sentence.split_whitespace().collect::<Vec<_>>();

  let chart = match parser.chart_parse(&sentence) {
    Ok(chart) => chart,
    Err(e) => {
      println!("{}", e);
      return Ok(());
    }
  };

  if opts.print_chart {
    println!("chart:\n{}\n", chart.pretty_format(None));
  }

  let start = parser.grammar().start();
  let trees = chart.parses(start).into_iter().collect::<Vec<_>>();

  println!(
    "Parsed {} tree{}",
    trees.len(),
    if trees.len() == 1 { "" } else { "s" }
  );

  for t in trees.iter() {
    println!("{}", t.bracketed());
    println!("{}", t);
    println!();
  }

  if parser.grammar().is_weighted() {
    if let Some((best, p)) = chart.parses(start).best() {
      println!("most probable (p={:.6}): {}", p, best.bracketed());
    }
  }

  if opts.print_fs {
    for edge in chart.root_edges(start) {
      if let Some(features) = edge.features() {
        println!("{}", chart.arena().display(features.idx));
      }
    }
  }

  Ok(())
}

struct Args {
  filename: String,
  print_fs: bool,
  print_chart: bool,
  subsumption: bool,
  step_limit: Option<usize>,
  strategy: String,
  trace: bool,
}

impl Args {
  fn make_error_message(msg: &str, prog_name: impl AsRef<str>) -> String {
    format!("argument error: {}.\n\n{}", msg, usage(prog_name.as_ref()))
  }

  fn parse(v: Vec<String>) -> Result<Self, String> {
    if v.is_empty() {
      return Err(Self::make_error_message("bad argument vector", "featchart"));
    }

    let args_len = v.len();
    let mut iter = v.into_iter();
    let prog_name = iter.next().unwrap_or_else(|| "featchart".to_string());

    if args_len < 2 {
      return Err(Self::make_error_message("not enough arguments", prog_name));
    }

    let mut filename: Option<String> = None;
    let mut print_fs = true; // default to printing feature structures
    let mut print_chart = false; // default to *not* printing the chart
    let mut subsumption = false;
    let mut step_limit = None;
    let mut strategy = "earley".to_string();
    let mut trace = false;

    while let Some(o) = iter.next() {
      if o == "-h" || o == "--help" {
        println!("{}", usage(&prog_name));
        process::exit(0);
      } else if o == "-n" || o == "--no-fs" {
        print_fs = false;
      } else if o == "-c" || o == "--chart" {
        print_chart = true;
      } else if o == "-s" || o == "--subsume" {
        subsumption = true;
      } else if o == "-t" || o == "--trace" {
        trace = true;
      } else if o == "-l" || o == "--limit" {
        let n = iter
          .next()
          .and_then(|n| n.parse::<usize>().ok())
          .ok_or_else(|| Self::make_error_message("--limit needs a number", &prog_name))?;
        step_limit = Some(n);
      } else if o == "--strategy" {
        strategy = iter
          .next()
          .filter(|name| matches!(name.as_str(), "earley" | "bottom-up" | "left-corner"))
          .ok_or_else(|| {
            let msg = "--strategy needs earley, bottom-up or left-corner";
            Self::make_error_message(msg, &prog_name)
          })?;
      } else if filename.is_none() {
        filename = Some(o);
      } else {
        return Err(Self::make_error_message("invalid arguments", prog_name));
      }
    }

    if let Some(filename) = filename {
      Ok(Self {
        filename,
        print_fs,
        print_chart,
        subsumption,
        step_limit,
        strategy,
        trace,
      })
    } else {
      Err(Self::make_error_message("missing filename", prog_name))
    }
  }

  fn strategy(&self) -> Vec<Box<dyn ChartRule>> {
    match self.strategy.as_str() {
      "bottom-up" => bottom_up_strategy(),
      "left-corner" => left_corner_strategy(),
      _ => default_strategy(),
    }
  }

  fn parser_options(&self) -> ParserOptions {
    let options = ParserOptions::default().with_subsumption(self.subsumption);
    match self.step_limit {
      Some(limit) => options.with_step_limit(limit),
      None => options,
    }
  }
}

fn main() -> Result<(), Err> {
  let opts = match Args::parse(env::args().collect()) {
    Ok(opts) => opts,
    Err(msg) => {
      eprintln!("{}", msg);
      process::exit(255);
    }
  };
  init_subscriber(opts.trace);

  let g: Grammar = Grammar::read_from_file(&opts.filename)?;
  info!(
    file = %opts.filename,
    start = g.start(),
    productions = g.len(),
    weighted = g.is_weighted(),
    "loaded grammar"
  );
  let parser = EarleyParser::new(&g)
    .with_options(opts.parser_options())
    .with_strategy(opts.strategy());

  let mut input = String::new();
  loop {
    print!("> ");
    io::stdout().flush()?;

    match io::stdin().read_line(&mut input) {
      Ok(_) => {
        if input.is_empty() {
          // ctrl+d
          return Ok(());
        }
        parse(&parser, input.trim(), &opts)?;
        input.clear();
      }
      Err(error) => return Err(error.into()),
    }
  }
}
