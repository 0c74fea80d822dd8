mod job;

use std::{env, fs, io};

use hogwild::Driver;
use log::{info, warn};
use tokio::signal;

use crate::job::Job;

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let path = env::args()
        .nth(1)
        .or_else(|| env::var("JOB").ok())
        .ok_or_else(|| io::Error::other("usage: node <job.json>"))?;

    let job = Job::load(&path)?;
    let training = job.training.clone();
    let output = job.output.clone();
    let (frame, model, store) = job.build()?;
    info!(job = path.as_str(), model = model.model_id(); "loaded training job");

    let driver = Driver::new(training, store)?;
    let token = driver.cancellation_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current round");
            token.cancel();
        }
    });

    let outcome = driver.train(model, &frame).await?;

    for round in &outcome.rounds {
        println!("{round}");
    }
    println!("{}", outcome.model);
    println!("stopped: {}", outcome.reason);

    if let Some(output) = output {
        let json = serde_json::to_string(&outcome.model).map_err(io::Error::other)?;
        fs::write(&output, json)?;
        let shown = output.display().to_string();
        info!(path = shown.as_str(); "wrote the trained model");
    }

    Ok(())
}
