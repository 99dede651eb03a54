use crate::data::TweetLine;
use crate::extract::LocationExtractor;
use crate::locate::PointLocator;
use crate::types::Region;
use anyhow::{Context, Result};
use std::io::Write;
use tracing::{info, trace};

/// Tweet counts per feature for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    /// Indexed by feature position in the features file
    pub counts: Vec<u64>,
    /// Located tweets that fell outside every feature
    pub unmatched: u64,
    /// Records with no usable coordinate at the key path
    pub skipped: u64,
    /// Lines that were not valid JSON
    pub malformed: u64,
}

impl Tally {
    pub fn new(feature_count: usize) -> Self {
        Self {
            counts: vec![0; feature_count],
            unmatched: 0,
            skipped: 0,
            malformed: 0,
        }
    }

    pub fn record(&mut self, feature: Option<usize>) {
        match feature {
            Some(i) => self.counts[i] += 1,
            None => self.unmatched += 1,
        }
    }

    pub fn matched(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Number of tweets whose coordinate was successfully extracted.
    pub fn located(&self) -> u64 {
        self.matched() + self.unmatched
    }

    /// Highest count of any feature; tweets in no feature are not considered.
    pub fn max_count(&self) -> u64 {
        self.counts.iter().copied().max().unwrap_or(0)
    }
}

/// Run every line through extraction and location, counting the results.
pub fn tally_tweets<I>(
    lines: I,
    extractor: &LocationExtractor,
    locator: &PointLocator,
) -> Result<Tally>
where
    I: IntoIterator<Item = Result<TweetLine>>,
{
    let mut tally = Tally::new(locator.len());

    for line in lines {
        match line? {
            TweetLine::Malformed => tally.malformed += 1,
            TweetLine::Record(record) => match extractor.extract(&record) {
                Some(point) => tally.record(locator.locate(&point)),
                None => {
                    trace!("No coordinate in record: {}", record);
                    tally.skipped += 1;
                }
            },
        }
    }

    info!(
        "Located {} tweets ({} in a feature, {} unknown), skipped {} without coordinates and {} malformed lines",
        tally.located(),
        tally.matched(),
        tally.unmatched,
        tally.skipped,
        tally.malformed
    );

    Ok(tally)
}

/// Write the per-feature CSV summary: features with tweets sorted by name,
/// then a row for tweets outside every feature.
pub fn write_report<W: Write>(writer: W, regions: &[Region], tally: &Tally) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["Feature", "Tweet Count"])?;

    let mut named: Vec<&Region> = regions.iter().filter(|r| tally.counts[r.index] > 0).collect();
    named.sort_by(|a, b| a.name.cmp(&b.name).then(a.index.cmp(&b.index)));

    for region in named {
        let count = tally.counts[region.index].to_string();
        wtr.write_record([region.name.as_str(), count.as_str()])?;
    }
    if tally.unmatched > 0 {
        let count = tally.unmatched.to_string();
        wtr.write_record(["Unknown Location", count.as_str()])?;
    }

    wtr.flush().context("Failed to write report")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocationFormat;
    use geo::{polygon, MultiPolygon};
    use serde_json::{json, Map};

    fn regions() -> Vec<Region> {
        let a = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
        let b = polygon![(x: 2.0, y: 0.0), (x: 3.0, y: 0.0), (x: 3.0, y: 1.0), (x: 2.0, y: 1.0)];
        vec![
            Region { index: 0, name: "Zulu".into(), properties: Map::new(), geometry: MultiPolygon::new(vec![a]) },
            Region { index: 1, name: "Alpha".into(), properties: Map::new(), geometry: MultiPolygon::new(vec![b]) },
        ]
    }

    fn tweet(lon: f64, lat: f64) -> Result<TweetLine> {
        Ok(TweetLine::Record(json!({"coordinates": {"coordinates": [lon, lat]}})))
    }

    fn run(lines: Vec<Result<TweetLine>>) -> Tally {
        let regions = regions();
        let locator = PointLocator::new(&regions);
        let extractor = LocationExtractor::new(
            vec!["coordinates".into(), "coordinates".into()],
            LocationFormat::LonLatArray,
        );
        tally_tweets(lines, &extractor, &locator).unwrap()
    }

    #[test]
    fn counts_matched_unmatched_and_skipped() {
        let tally = run(vec![
            tweet(0.5, 0.5),
            tweet(2.5, 0.5),
            tweet(2.1, 0.9),
            tweet(50.0, 50.0),
            Ok(TweetLine::Record(json!({"coordinates": null}))),
            Ok(TweetLine::Malformed),
        ]);
        assert_eq!(tally.counts, vec![1, 2]);
        assert_eq!(tally.unmatched, 1);
        assert_eq!(tally.skipped, 1);
        assert_eq!(tally.malformed, 1);
        assert_eq!(tally.located(), 4);
        assert_eq!(tally.max_count(), 2);
    }

    #[test]
    fn outside_point_only_touches_unmatched() {
        let tally = run(vec![tweet(-10.0, -10.0)]);
        assert_eq!(tally.counts, vec![0, 0]);
        assert_eq!(tally.unmatched, 1);
        assert_eq!(tally.max_count(), 0);
    }

    #[test]
    fn tally_is_sized_from_the_locator() {
        let regions = regions();
        let locator = PointLocator::new(&regions[..1]);
        let extractor = LocationExtractor::new(vec!["c".into()], LocationFormat::LonLatArray);
        let lines = vec![Ok(TweetLine::Record(json!({"c": [0.5, 0.5]})))];
        let tally = tally_tweets(lines, &extractor, &locator).unwrap();
        assert_eq!(tally.counts, vec![1]);
    }

    #[test]
    fn read_errors_abort() {
        let regions = regions();
        let locator = PointLocator::new(&regions);
        let extractor = LocationExtractor::new(vec!["c".into()], LocationFormat::LonLatArray);
        let lines = vec![tweet(0.5, 0.5), Err(anyhow::anyhow!("disk on fire"))];
        assert!(tally_tweets(lines, &extractor, &locator).is_err());
    }

    #[test]
    fn report_is_sorted_by_name_with_unknown_last() {
        let tally = Tally { counts: vec![3, 5], unmatched: 2, skipped: 9, malformed: 1 };
        let mut out = Vec::new();
        write_report(&mut out, &regions(), &tally).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Feature,Tweet Count\nAlpha,5\nZulu,3\nUnknown Location,2\n"
        );
    }

    #[test]
    fn report_omits_empty_rows() {
        let tally = Tally { counts: vec![4, 0], unmatched: 0, skipped: 0, malformed: 0 };
        let mut out = Vec::new();
        write_report(&mut out, &regions(), &tally).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Feature,Tweet Count\nZulu,4\n");
    }
}
