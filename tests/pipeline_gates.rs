// Acceptance pipeline behavior under scripted collaborators.
//
// Every stub here counts its calls, so each test can pin down exactly how
// much work the two retry loops perform and where a failure sends control.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;

use shortsmith::pipeline::controller::{
    GenerationRequest, Pipeline, PipelineError, PipelineLimits,
};
use shortsmith::pipeline::topics::TopicPicker;
use shortsmith::pipeline::{
    AssetSource, AssetVerifier, CandidateAsset, Composer, FactWriter, FinalAuditor, GeneratedFact,
    MusicPicker, MusicTrack, RenderedArtifact, Verification,
};

struct CountingSource {
    calls: AtomicUsize,
    topics: Mutex<Vec<String>>,
}

impl CountingSource {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            topics: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl AssetSource for CountingSource {
    async fn fetch_candidate(&self, topic: &str, _min_duration: u32) -> Result<CandidateAsset> {
        self.topics.lock().unwrap().push(topic.to_string());
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CandidateAsset {
            id: n as u64,
            path: PathBuf::from(format!("clip_{n}.mp4")),
            description: "a lion walking through grass".to_string(),
            duration: 14.0,
            width: 1080,
            height: 1920,
        })
    }
}

/// Approves only the call whose 1-based number equals `approve_on`.
struct ScriptedVerifier {
    calls: AtomicUsize,
    approve_on: Option<usize>,
}

impl ScriptedVerifier {
    fn approving(on: usize) -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), approve_on: Some(on) })
    }

    fn rejecting() -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), approve_on: None })
    }
}

#[async_trait]
impl AssetVerifier for ScriptedVerifier {
    async fn verify(&self, asset: &CandidateAsset) -> Result<Verification> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let approved = self.approve_on == Some(n);
        let _ = asset;
        Ok(Verification {
            approved,
            explanation: if approved { "clear subject".into() } else { "wrong subject".into() },
            trim_point: if approved { 2.0 } else { 0.0 },
            best_frame: 3,
        })
    }
}

/// Waves every clip through; for tests where only later stages matter.
struct AlwaysApprove;

#[async_trait]
impl AssetVerifier for AlwaysApprove {
    async fn verify(&self, _asset: &CandidateAsset) -> Result<Verification> {
        Ok(Verification {
            approved: true,
            explanation: "fine".into(),
            trim_point: 1.0,
            best_frame: 2,
        })
    }
}

struct ScriptedWriter {
    generates: AtomicUsize,
    scores: AtomicUsize,
    score_sequence: Vec<u8>,
    scored_args: Mutex<Vec<(String, String)>>,
    related_args: Mutex<Vec<String>>,
}

impl ScriptedWriter {
    fn with_scores(scores: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            generates: AtomicUsize::new(0),
            scores: AtomicUsize::new(0),
            score_sequence: scores,
            scored_args: Mutex::new(Vec::new()),
            related_args: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl FactWriter for ScriptedWriter {
    async fn generate_for_asset(&self, asset_description: &str) -> Result<GeneratedFact> {
        let n = self.generates.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GeneratedFact {
            hook: format!("Hook number {n}"),
            fact_text: format!("Fact about {asset_description}, take {n}"),
            highlight_words: vec!["lion".to_string()],
            category: "nature".to_string(),
            self_score: 9,
            independent_score: None,
        })
    }

    async fn score(&self, hook: &str, fact_text: &str) -> Result<u8> {
        let n = self.scores.fetch_add(1, Ordering::SeqCst);
        self.scored_args
            .lock()
            .unwrap()
            .push((hook.to_string(), fact_text.to_string()));
        Ok(*self
            .score_sequence
            .get(n)
            .or(self.score_sequence.last())
            .unwrap_or(&9))
    }

    async fn related_topic(&self, topic: &str) -> Result<String> {
        self.related_args.lock().unwrap().push(topic.to_string());
        Ok(format!("{topic} cubs"))
    }
}

struct NoMusic;

#[async_trait]
impl MusicPicker for NoMusic {
    async fn pick(&self, _fact: &GeneratedFact) -> Result<Option<MusicTrack>> {
        Ok(None)
    }
}

struct BrokenMusic;

#[async_trait]
impl MusicPicker for BrokenMusic {
    async fn pick(&self, _fact: &GeneratedFact) -> Result<Option<MusicTrack>> {
        bail!("music library on fire")
    }
}

/// Writes a real file for every render so audit-driven deletion is
/// observable on disk.
struct FileComposer {
    renders: AtomicUsize,
    durations: Mutex<Vec<u32>>,
}

impl FileComposer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            renders: AtomicUsize::new(0),
            durations: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Composer for FileComposer {
    async fn render(
        &self,
        _asset: &CandidateAsset,
        _trim_point: f64,
        duration_secs: u32,
        _fact: &GeneratedFact,
        _music: Option<&MusicTrack>,
        output: &Path,
    ) -> Result<RenderedArtifact> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        self.durations.lock().unwrap().push(duration_secs);
        std::fs::write(output, b"rendered video bytes")?;
        Ok(RenderedArtifact {
            path: output.to_path_buf(),
            duration: duration_secs as f64,
            width: 1080,
            height: 1920,
        })
    }
}

/// Answers audits from a fixed script, `None` meaning an error.
struct ScriptedAuditor {
    calls: AtomicUsize,
    verdicts: Vec<Option<bool>>,
}

impl ScriptedAuditor {
    fn with(verdicts: Vec<Option<bool>>) -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), verdicts })
    }

    fn approving() -> Arc<Self> {
        Self::with(vec![Some(true)])
    }
}

#[async_trait]
impl FinalAuditor for ScriptedAuditor {
    async fn audit(&self, _artifact: &Path, _fact: &GeneratedFact) -> Result<bool> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.verdicts.get(n).copied().or(self.verdicts.last().copied()) {
            Some(Some(verdict)) => Ok(verdict),
            _ => bail!("audit service unreachable"),
        }
    }
}

fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("shortsmith_gates_{name}"));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn request(output_dir: &Path, with_music: bool) -> GenerationRequest {
    GenerationRequest {
        topic: Some("lions".to_string()),
        duration_secs: 8,
        with_music,
        output: None,
        output_dir: output_dir.to_path_buf(),
    }
}

#[allow(clippy::too_many_arguments)]
fn pipeline(
    source: Arc<CountingSource>,
    verifier: Arc<ScriptedVerifier>,
    writer: Arc<ScriptedWriter>,
    music: Arc<dyn MusicPicker>,
    composer: Arc<FileComposer>,
    auditor: Arc<ScriptedAuditor>,
) -> Pipeline {
    Pipeline::new(
        source,
        verifier,
        writer,
        music,
        composer,
        auditor,
        TopicPicker::new(StdRng::seed_from_u64(11)),
        PipelineLimits::default(),
        StdRng::seed_from_u64(22),
    )
}

#[tokio::test]
async fn happy_path_touches_each_stage_once() {
    let dir = test_dir("happy");
    let source = CountingSource::new();
    let verifier = ScriptedVerifier::approving(1);
    let writer = ScriptedWriter::with_scores(vec![9]);
    let composer = FileComposer::new();
    let auditor = ScriptedAuditor::approving();

    let mut p = pipeline(
        source.clone(),
        verifier.clone(),
        writer.clone(),
        Arc::new(NoMusic),
        composer.clone(),
        auditor.clone(),
    );
    let accepted = p.run(&request(&dir, false)).await.unwrap();

    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
    assert_eq!(writer.generates.load(Ordering::SeqCst), 1);
    assert_eq!(writer.scores.load(Ordering::SeqCst), 1);
    assert_eq!(composer.renders.load(Ordering::SeqCst), 1);
    assert_eq!(auditor.calls.load(Ordering::SeqCst), 1);
    assert_eq!(accepted.outer_attempts, 1);
    assert_eq!(accepted.fact.independent_score, Some(9));
    assert!(accepted.artifact.path.is_file());

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn asset_churn_stays_inside_one_outer_attempt() {
    let dir = test_dir("churn");
    let source = CountingSource::new();
    // Rejections on clips 1-4, approval on the 5th and last slot.
    let verifier = ScriptedVerifier::approving(5);
    let writer = ScriptedWriter::with_scores(vec![10]);
    let composer = FileComposer::new();

    let mut p = pipeline(
        source.clone(),
        verifier.clone(),
        writer.clone(),
        Arc::new(NoMusic),
        composer.clone(),
        ScriptedAuditor::approving(),
    );
    let accepted = p.run(&request(&dir, false)).await.unwrap();

    assert_eq!(source.calls.load(Ordering::SeqCst), 5);
    assert_eq!(verifier.calls.load(Ordering::SeqCst), 5);
    assert_eq!(accepted.outer_attempts, 1);
    assert_eq!(writer.generates.load(Ordering::SeqCst), 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn unverifiable_footage_exhausts_both_budgets() {
    let dir = test_dir("exhaust");
    let source = CountingSource::new();
    let verifier = ScriptedVerifier::rejecting();
    let writer = ScriptedWriter::with_scores(vec![9]);
    let composer = FileComposer::new();

    let mut p = pipeline(
        source.clone(),
        verifier.clone(),
        writer.clone(),
        Arc::new(NoMusic),
        composer.clone(),
        ScriptedAuditor::approving(),
    );
    let err = p.run(&request(&dir, false)).await.unwrap_err();

    // 5 asset attempts per outer attempt, 10 outer attempts.
    assert_eq!(source.calls.load(Ordering::SeqCst), 50);
    assert_eq!(writer.generates.load(Ordering::SeqCst), 0);
    assert_eq!(composer.renders.load(Ordering::SeqCst), 0);
    match err {
        PipelineError::AssetsExhausted { fetch_attempts, outer_attempts } => {
            assert_eq!(fetch_attempts, 50);
            assert_eq!(outer_attempts, 10);
        }
        other => panic!("expected AssetsExhausted, got {other}"),
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn dull_fact_restarts_the_whole_attempt() {
    let dir = test_dir("dull");
    let source = CountingSource::new();
    // Every clip is approved immediately; only quality fails.
    let writer = ScriptedWriter::with_scores(vec![6, 9]);
    let composer = FileComposer::new();

    let mut p = Pipeline::new(
        source.clone(),
        Arc::new(AlwaysApprove),
        writer.clone(),
        Arc::new(NoMusic),
        composer.clone(),
        ScriptedAuditor::approving(),
        TopicPicker::new(StdRng::seed_from_u64(11)),
        PipelineLimits::default(),
        StdRng::seed_from_u64(22),
    );
    let accepted = p.run(&request(&dir, false)).await.unwrap();

    // A low score discards the fact AND the asset: attempt two re-fetches.
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    assert_eq!(writer.generates.load(Ordering::SeqCst), 2);
    assert_eq!(writer.scores.load(Ordering::SeqCst), 2);
    assert_eq!(composer.renders.load(Ordering::SeqCst), 1);
    assert_eq!(accepted.outer_attempts, 2);
    assert_eq!(accepted.fact.independent_score, Some(9));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn audit_rejection_discards_the_artifact_and_retries() {
    let dir = test_dir("audit_reject");
    let source = CountingSource::new();
    let writer = ScriptedWriter::with_scores(vec![9]);
    let composer = FileComposer::new();
    let auditor = ScriptedAuditor::with(vec![Some(false), Some(true)]);

    let mut p = Pipeline::new(
        source,
        Arc::new(AlwaysApprove),
        writer,
        Arc::new(NoMusic),
        composer.clone(),
        auditor.clone(),
        TopicPicker::new(StdRng::seed_from_u64(11)),
        PipelineLimits::default(),
        StdRng::seed_from_u64(22),
    );
    let accepted = p.run(&request(&dir, false)).await.unwrap();

    assert_eq!(composer.renders.load(Ordering::SeqCst), 2);
    assert_eq!(auditor.calls.load(Ordering::SeqCst), 2);
    assert_eq!(accepted.outer_attempts, 2);
    assert!(accepted.artifact.path.is_file());

    // The rejected first render must not survive on disk.
    let survivors: Vec<_> = std::fs::read_dir(&dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|x| x == "mp4").unwrap_or(false))
        .collect();
    assert_eq!(survivors.len(), 1);
    assert_eq!(survivors[0].path(), accepted.artifact.path);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn unreachable_auditor_fails_open() {
    let dir = test_dir("audit_open");
    let source = CountingSource::new();
    let writer = ScriptedWriter::with_scores(vec![9]);
    let composer = FileComposer::new();
    // None in the script means the auditor errors out.
    let auditor = ScriptedAuditor::with(vec![None]);

    let mut p = pipeline(
        source,
        ScriptedVerifier::approving(1),
        writer,
        Arc::new(NoMusic),
        composer.clone(),
        auditor,
    );
    let accepted = p.run(&request(&dir, false)).await.unwrap();

    assert_eq!(accepted.outer_attempts, 1);
    assert!(accepted.artifact.path.is_file());

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn broken_music_degrades_to_silence() {
    let dir = test_dir("music");
    let source = CountingSource::new();
    let writer = ScriptedWriter::with_scores(vec![9]);
    let composer = FileComposer::new();

    let mut p = pipeline(
        source,
        ScriptedVerifier::approving(1),
        writer,
        Arc::new(BrokenMusic),
        composer.clone(),
        ScriptedAuditor::approving(),
    );
    let accepted = p.run(&request(&dir, true)).await.unwrap();

    assert!(accepted.music.is_none());
    assert_eq!(composer.renders.load(Ordering::SeqCst), 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn explicit_topic_is_pinned_across_retries() {
    let dir = test_dir("pinned");
    let source = CountingSource::new();
    // First fact is dull, so the outer loop goes around once.
    let writer = ScriptedWriter::with_scores(vec![6, 9]);
    let composer = FileComposer::new();

    let mut p = Pipeline::new(
        source.clone(),
        Arc::new(AlwaysApprove),
        writer.clone(),
        Arc::new(NoMusic),
        composer,
        ScriptedAuditor::approving(),
        TopicPicker::new(StdRng::seed_from_u64(11)),
        PipelineLimits::default(),
        StdRng::seed_from_u64(22),
    );
    let accepted = p.run(&request(&dir, false)).await.unwrap();
    assert_eq!(accepted.outer_attempts, 2);

    // Every fetch in the run used the requested topic verbatim.
    let topics = source.topics.lock().unwrap();
    assert_eq!(*topics, vec!["lions".to_string(), "lions".to_string()]);
    // No rotation machinery was consulted for a pinned topic.
    assert!(writer.related_args.lock().unwrap().is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn retry_abandons_the_failed_topic() {
    let dir = test_dir("abandon");
    let source = CountingSource::new();
    let writer = ScriptedWriter::with_scores(vec![6, 9]);
    let composer = FileComposer::new();

    let mut p = Pipeline::new(
        source.clone(),
        Arc::new(AlwaysApprove),
        writer.clone(),
        Arc::new(NoMusic),
        composer,
        ScriptedAuditor::approving(),
        TopicPicker::new(StdRng::seed_from_u64(11)),
        PipelineLimits::default(),
        StdRng::seed_from_u64(22),
    );
    let mut req = request(&dir, false);
    req.topic = None;
    p.run(&req).await.unwrap();

    let topics = source.topics.lock().unwrap();
    assert_eq!(topics.len(), 2);
    let failed = &topics[0];
    // The second attempt runs on a fresh hint (or its related expansion),
    // never on the topic that just failed.
    assert_ne!(&topics[1], failed);
    // Related suggestions expand the fresh draw, not the failed topic.
    for arg in writer.related_args.lock().unwrap().iter() {
        assert_ne!(arg, failed);
    }

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn requested_duration_reaches_the_renderer() {
    let dir = test_dir("duration");
    let source = CountingSource::new();
    let writer = ScriptedWriter::with_scores(vec![9]);
    let composer = FileComposer::new();

    let mut p = pipeline(
        source,
        ScriptedVerifier::approving(1),
        writer,
        Arc::new(NoMusic),
        composer.clone(),
        ScriptedAuditor::approving(),
    );
    let mut req = request(&dir, false);
    req.duration_secs = 15;
    let accepted = p.run(&req).await.unwrap();

    assert_eq!(*composer.durations.lock().unwrap(), vec![15]);
    assert_eq!(accepted.artifact.duration, 15.0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn persistent_dullness_reports_the_best_score() {
    let dir = test_dir("quality_exhausted");
    let source = CountingSource::new();
    // Scores never clear the bar; 7 is the best the run ever sees.
    let writer = ScriptedWriter::with_scores(vec![5, 7, 6]);
    let composer = FileComposer::new();

    let mut p = Pipeline::new(
        source.clone(),
        Arc::new(AlwaysApprove),
        writer.clone(),
        Arc::new(NoMusic),
        composer.clone(),
        ScriptedAuditor::approving(),
        TopicPicker::new(StdRng::seed_from_u64(11)),
        PipelineLimits::default(),
        StdRng::seed_from_u64(22),
    );
    let err = p.run(&request(&dir, false)).await.unwrap_err();

    assert_eq!(writer.generates.load(Ordering::SeqCst), 10);
    assert_eq!(composer.renders.load(Ordering::SeqCst), 0);
    match err {
        PipelineError::QualityExhausted { attempts, best_score } => {
            assert_eq!(attempts, 10);
            assert_eq!(best_score, 7);
        }
        other => panic!("expected QualityExhausted, got {other}"),
    }

    // Nothing was rendered, so nothing may be left on disk.
    let leftovers = std::fs::read_dir(&dir).unwrap().count();
    assert_eq!(leftovers, 0);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn scoring_sees_only_the_written_words() {
    let dir = test_dir("cold_score");
    let source = CountingSource::new();
    let writer = ScriptedWriter::with_scores(vec![9]);
    let composer = FileComposer::new();

    let mut p = pipeline(
        source,
        ScriptedVerifier::approving(1),
        writer.clone(),
        Arc::new(NoMusic),
        composer,
        ScriptedAuditor::approving(),
    );
    let accepted = p.run(&request(&dir, false)).await.unwrap();

    let args = writer.scored_args.lock().unwrap();
    assert_eq!(args.len(), 1);
    let (hook, fact_text) = &args[0];
    assert_eq!(hook, &accepted.fact.hook);
    assert_eq!(fact_text, &accepted.fact.fact_text);
    // The requested topic never reaches the scorer.
    assert!(!hook.contains("lions"));
    assert!(!fact_text.contains("lions"));

    let _ = std::fs::remove_dir_all(&dir);
}
