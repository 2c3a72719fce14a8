// main.rs
// Runs a TOML-described simulation on in-process ranks and prints the totals as JSON

use std::env;

use multispecies_pic::config::InputFile;
use multispecies_pic::error::PicResult;
use multispecies_pic::parallel::ThreadComm;
use multispecies_pic::simulation::{RunSummary, Simulation};

fn run_rank(input: &InputFile, comm: &ThreadComm) -> PicResult<RunSummary> {
    let mut sim = Simulation::from_input(input, comm)?;
    sim.init()?;
    sim.run()
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let path = match args.len() {
        2 => &args[1],
        1 => {
            eprintln!("Usage: {} <input.toml>", args[0]);
            std::process::exit(1)
        }
        _ => {
            eprintln!("Too many arguments. Usage: {} <input.toml>", args[0]);
            std::process::exit(1)
        }
    };

    let input = match InputFile::load_from_file(path) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("Error reading input file {}: {}", path, e);
            std::process::exit(1)
        }
    };

    let n_ranks = input.run.n_ranks.max(1);
    let results = ThreadComm::run(n_ranks, |comm| run_rank(&input, comm));

    let mut summary = None;
    for (rank, result) in results.into_iter().enumerate() {
        match result {
            Ok(s) if rank == 0 => summary = Some(s),
            Ok(_) => {}
            Err(e) => {
                eprintln!("Error during simulation on rank {}: {}", rank, e);
                std::process::exit(1)
            }
        }
    }

    if let Some(summary) = summary {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error writing summary: {}", e);
                std::process::exit(1)
            }
        }
    }

    #[cfg(feature = "profiling")]
    multispecies_pic::PROFILER.lock().log_and_clear();
}
