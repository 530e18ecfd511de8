//! Crawl command - walk the reference graph from a seed issue or PR

use std::io::Write;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use refgraph_core::{
    parse_github_url, Config, CrawlEvent, Crawler, NodeState, ReferenceParser, WorkItem,
};
use refgraph_github::GitHubClient;

/// Arguments for the crawl command
#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Seed URL, e.g. https://github.com/owner/repo/issues/12
    #[arg(required = true)]
    pub url: String,

    /// Number of concurrent fetches (overrides config and env)
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Stop following references this many hops from the seed
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One human-readable line per event
    Text,
    /// One JSON object per event
    Json,
}

#[derive(Debug, Default)]
struct Summary {
    nodes: usize,
    errors: usize,
    references: usize,
}

impl CrawlArgs {
    /// Execute the crawl command
    pub async fn execute(&self, verbose: bool, config: &Config) -> anyhow::Result<()> {
        let seed = parse_github_url(&self.url)?;

        let taxonomy = Arc::new(config.load_taxonomy()?);
        let parser = ReferenceParser::new(taxonomy)?;

        let client = GitHubClient::from_secrets(&config.github)?;
        if !client.is_authenticated() {
            anyhow::bail!(
                "Crawling uses GitHub's GraphQL API, which requires a token. \
                 Set GITHUB_TOKEN or run `refgraph init-secrets`"
            );
        }

        if verbose {
            tracing::info!(
                seed = %seed,
                concurrency = config.crawl.concurrency,
                max_depth = ?config.crawl.max_depth,
                "Starting refgraph crawl"
            );
        }

        let (crawler, mut events) =
            Crawler::new(Arc::new(client), parser, config.crawl.max_depth);
        crawler.enqueue(WorkItem::seed(seed));

        let run = crawler.start(config.crawl.concurrency);
        let mut wait = std::pin::pin!(run.wait());
        let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
        let mut stopping = false;

        let mut out = std::io::stdout();
        let mut summary = Summary::default();

        loop {
            tokio::select! {
                Some(event) = events.recv() => {
                    self.print_event(&mut out, &event, &mut summary)?;
                }
                result = &mut wait => {
                    result?;
                    break;
                }
                _ = &mut ctrl_c, if !stopping => {
                    eprintln!("Stopping crawl after in-flight fetches...");
                    crawler.stop();
                    stopping = true;
                }
            }
        }

        // Events sent by the last workers before they exited
        while let Ok(event) = events.try_recv() {
            self.print_event(&mut out, &event, &mut summary)?;
        }
        out.flush()?;

        let stats = crawler.stats();
        eprintln!();
        eprintln!(
            "{} {} node(s), {} error(s), {} reference(s)",
            if stopping { "Stopped:" } else { "Done:" },
            summary.nodes,
            summary.errors,
            summary.references
        );
        if stats.pending > 0 {
            eprintln!("{} queued node(s) were not fetched", stats.pending);
        }

        Ok(())
    }

    fn print_event(
        &self,
        out: &mut impl Write,
        event: &CrawlEvent,
        summary: &mut Summary,
    ) -> anyhow::Result<()> {
        match event {
            CrawlEvent::NodeFound { .. } => summary.nodes += 1,
            CrawlEvent::NodeError { .. } => summary.errors += 1,
            CrawlEvent::ReferenceFound { .. } => summary.references += 1,
            CrawlEvent::DepthLowered { .. } => {}
        }

        match self.format {
            OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(event)?)?,
            OutputFormat::Text => writeln!(out, "{}", format_event(event))?,
        }
        Ok(())
    }
}

fn format_event(event: &CrawlEvent) -> String {
    match event {
        CrawlEvent::NodeFound {
            identity,
            depth,
            node,
        } => {
            let state = match node.state {
                NodeState::Open if node.is_draft => "draft",
                NodeState::Open => "open",
                NodeState::Closed => "closed",
                NodeState::Merged => "merged",
            };
            let kind = if node.is_pull_request() { "pr" } else { "issue" };
            format!("[{}] {} ({} {}) {}", depth, identity, kind, state, node.title)
        }
        CrawlEvent::NodeError {
            identity,
            depth,
            source,
            error,
        } => match source {
            Some(source) => format!("[{}] {} (from {}) error: {}", depth, identity, source, error),
            None => format!("[{}] {} error: {}", depth, identity, error),
        },
        CrawlEvent::ReferenceFound { reference } => format!(
            "    {} -[{}]-> {}",
            reference.source, reference.reference_type.id, reference.target
        ),
        CrawlEvent::DepthLowered { identity, depth } => {
            format!("[{}] {} (shorter path)", depth, identity)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refgraph_core::{Identity, NodeData};

    #[test]
    fn test_format_node_found() {
        let event = CrawlEvent::NodeFound {
            identity: Identity::new("o", "r", 1).unwrap(),
            depth: 0,
            node: Arc::new(NodeData::issue("Crash on start", "")),
        };
        assert_eq!(format_event(&event), "[0] o/r#1 (issue open) Crash on start");
    }

    #[test]
    fn test_format_reference() {
        let parser = ReferenceParser::builtin().unwrap();
        let source = Identity::new("o", "r", 1).unwrap();
        let reference = parser.get_references(&source, "fixes #2").remove(0);
        let event = CrawlEvent::ReferenceFound { reference };
        assert_eq!(format_event(&event), "    o/r#2 -[requires]-> o/r#1");
    }

    #[test]
    fn test_format_error_with_source() {
        let event = CrawlEvent::NodeError {
            identity: Identity::new("o", "r", 5).unwrap(),
            depth: 2,
            source: Some(Identity::new("o", "r", 1).unwrap()),
            error: "o/r#5 not found".to_string(),
        };
        assert_eq!(
            format_event(&event),
            "[2] o/r#5 (from o/r#1) error: o/r#5 not found"
        );
    }
}
