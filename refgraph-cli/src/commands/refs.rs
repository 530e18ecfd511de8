//! Refs command - run the reference parser over text without fetching

use std::io::Read;
use std::sync::Arc;

use clap::Args;
use refgraph_core::{Config, Identity, Reference, ReferenceParser};

/// Arguments for the refs command
#[derive(Args, Debug)]
pub struct RefsArgs {
    /// Issue or PR the text belongs to (owner/repo#number)
    #[arg(short, long)]
    pub source: Identity,

    /// Text to scan; read from stdin when omitted
    pub text: Option<String>,

    /// Print references as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl RefsArgs {
    /// Execute the refs command
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let text = match &self.text {
            Some(text) => text.clone(),
            None => {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            }
        };

        let parser = ReferenceParser::new(Arc::new(config.load_taxonomy()?))?;
        let references = parser.get_references(&self.source, &text);

        if references.is_empty() && !self.json {
            println!("No references found.");
            return Ok(());
        }

        for reference in &references {
            if self.json {
                println!("{}", serde_json::to_string(reference)?);
            } else {
                println!("{}", describe(reference));
            }
        }

        Ok(())
    }
}

fn describe(reference: &Reference) -> String {
    let follow = if reference.follow() { "" } else { " (not followed)" };
    format!(
        "{:?}: {} -[{}]-> {}{}",
        reference.text, reference.source, reference.reference_type.id, reference.target, follow
    )
}
