pub mod config;
pub mod data;
pub mod extract;
pub mod locate;
pub mod projection;
pub mod render;
pub mod tally;
pub mod types;

use anyhow::Result;
use std::io::Write;

/// Locate and count tweets, write the CSV report to `report`, then render the heatmap.
pub fn run<W: Write>(config: &config::AppConfig, report: W) -> Result<tally::Tally> {
    // 1. Load Features
    let regions = data::load_features(&config.input.features_file, &config.input.name_property)?;

    // 2. Locate and count tweets
    let extractor = extract::LocationExtractor::new(
        config.input.key_path.clone(),
        config.input.location_format,
    );
    let locator = locate::PointLocator::new(&regions);
    let tweets = data::TweetReader::new(config.input.data_files.clone());
    let tally = tally::tally_tweets(tweets, &extractor, &locator)?;

    // 3. Report
    tally::write_report(report, &regions, &tally)?;

    // 4. Render
    render::render_heatmap(&config.render, &regions, &tally)?;

    Ok(tally)
}
