//! Lineage command

use clap::Args;

use crate::output::print_lineage;
use crate::AppContext;
use tessera_core::limits::MAX_LINEAGE_DEPTH;
use tessera_core::EntityKind;

#[derive(Args)]
pub struct LineageArgs {
    /// Entity type
    pub kind: EntityKind,
    /// Fully qualified name
    pub fqn: String,
    /// Hops to follow against the data flow
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    pub upstream: i32,
    /// Hops to follow along the data flow
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    pub downstream: i32,
}

fn clamp(direction: &str, depth: i32) -> i32 {
    if depth > MAX_LINEAGE_DEPTH {
        tracing::warn!(
            "{} depth {} exceeds the maximum of {}, using {}",
            direction,
            depth,
            MAX_LINEAGE_DEPTH,
            MAX_LINEAGE_DEPTH
        );
        return MAX_LINEAGE_DEPTH;
    }
    depth
}

pub async fn run(args: &LineageArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let upstream = clamp("Upstream", args.upstream);
    let downstream = clamp("Downstream", args.downstream);

    let lineage = ctx
        .catalog
        .get_lineage_by_name(args.kind, &args.fqn, upstream, downstream)
        .await?;
    print_lineage(&lineage, ctx.format)
}
