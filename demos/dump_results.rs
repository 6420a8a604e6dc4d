// Print stored benchmark runs as JSON (deserializes wincode BLOBs).
//
// Usage: cargo run --example dump_results -- [DB_PATH] [RUN_ID]
//   DB_PATH  default: ./data/imagebench.db
//   RUN_ID   omitted: list the 10 most recent runs; given: the full run with its report

use imagebench::aggregation::{render_table, summarize};
use imagebench::results_repo::ResultsRepo;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let path = args
        .get(1)
        .map(String::as_str)
        .unwrap_or("./data/imagebench.db");

    let repo = ResultsRepo::connect(path).await?;
    repo.init().await?;

    match args.get(2) {
        None => {
            for run in repo.recent_runs(10).await? {
                println!(
                    "{}  tasks={} ok={}",
                    run.run_id, run.total_tasks, run.successes
                );
            }
        }
        Some(run_id) => {
            let Some(run) = repo.get_run(run_id).await? else {
                anyhow::bail!("no run {} in {}", run_id, path);
            };
            println!("{}", serde_json::to_string_pretty(&run)?);
            println!("{}", render_table(&summarize(&run)));
        }
    }
    Ok(())
}
