use anyhow::{Context, Result, ensure};
use futures_util::future::join_all;
use rand::seq::SliceRandom;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use stance_core::{
    CategoryId, LockedTakes, MemoryStore, PickRequest, Stance, StanceCardEntry, StanceEngine,
    Take, TakeCorpus, VoteContext, VotePayload, categories, encode_pairs,
};

pub type Engine = StanceEngine<MemoryStore, MemoryStore>;

/// Everything one scenario iteration gets to work with. Built fresh per
/// iteration so cache and vote state never leak between runs.
pub struct ScenarioCtx {
    pub engine: Arc<Engine>,
    pub store: Arc<MemoryStore>,
    pub corpus: Arc<TakeCorpus>,
    pub concurrency: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Spin,
    Pick,
    Codec,
    DecodeInvalid,
    Stampede,
    Votes,
    Stitch,
    Collection,
}

#[derive(Debug, Error)]
#[error("unknown scenario '{0}'")]
pub struct UnknownScenario(pub String);

impl Scenario {
    pub const ALL: [Self; 8] = [
        Self::Spin,
        Self::Pick,
        Self::Codec,
        Self::DecodeInvalid,
        Self::Stampede,
        Self::Votes,
        Self::Stitch,
        Self::Collection,
    ];

    pub const fn key(self) -> &'static str {
        match self {
            Self::Spin => "spin",
            Self::Pick => "pick",
            Self::Codec => "codec",
            Self::DecodeInvalid => "decode-invalid",
            Self::Stampede => "stampede",
            Self::Votes => "votes",
            Self::Stitch => "stitch",
            Self::Collection => "collection",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Spin => "One servable take per category, locks honoured in their own slot",
            Self::Pick => "Random picks respect category, exclusions and intensity range",
            Self::Codec => "A played card encodes to a URL-safe token and decodes back intact",
            Self::DecodeInvalid => "Malformed or unresolvable tokens decode to nothing",
            Self::Stampede => "Concurrent cold reads trigger exactly one corpus query",
            Self::Votes => "Receipts carry the running aggregate; amends keep the stance",
            Self::Stitch => "Anonymous votes bind to the first user once and only once",
            Self::Collection => "Saved cards are validated, deduplicated and listed",
        }
    }

    pub async fn run(self, ctx: &ScenarioCtx) -> Result<()> {
        match self {
            Self::Spin => spin(ctx).await,
            Self::Pick => pick(ctx).await,
            Self::Codec => codec(ctx).await,
            Self::DecodeInvalid => decode_invalid(ctx).await,
            Self::Stampede => stampede(ctx).await,
            Self::Votes => votes(ctx).await,
            Self::Stitch => stitch(ctx).await,
            Self::Collection => collection(ctx).await,
        }
    }
}

impl FromStr for Scenario {
    type Err = UnknownScenario;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.key() == s)
            .ok_or_else(|| UnknownScenario(s.to_string()))
    }
}

pub fn list_scenarios() -> impl Iterator<Item = (&'static str, &'static str)> {
    Scenario::ALL
        .into_iter()
        .map(|scenario| (scenario.key(), scenario.description()))
}

fn eligible_in(corpus: &TakeCorpus, category: CategoryId) -> Vec<&Take> {
    corpus
        .eligible()
        .filter(|take| take.category == category)
        .collect()
}

async fn played_card(ctx: &ScenarioCtx) -> Result<Vec<StanceCardEntry>> {
    let result = ctx.engine.spin(&LockedTakes::new()).await;
    ensure!(result.is_complete(), "spin returned {} of 6 takes", result.takes.len());
    Ok(result
        .takes
        .into_values()
        .enumerate()
        .map(|(i, take)| {
            let stance = if i % 3 == 0 { Stance::Disagree } else { Stance::Agree };
            StanceCardEntry::new(take, stance)
        })
        .collect())
}

async fn spin(ctx: &ScenarioCtx) -> Result<()> {
    let pinned = {
        let candidates = eligible_in(&ctx.corpus, CategoryId::Work);
        candidates
            .choose(&mut rand::thread_rng())
            .map(|take| take.id.clone())
            .context("corpus has no servable work takes")?
    };
    let foreign = eligible_in(&ctx.corpus, CategoryId::Money)
        .first()
        .map(|take| take.id.clone())
        .context("corpus has no servable money takes")?;

    let mut locked = LockedTakes::new();
    locked.lock(CategoryId::Work, pinned.as_str());
    locked.lock(CategoryId::Philosophy, foreign.as_str());

    let result = ctx.engine.spin(&locked).await;
    ensure!(result.is_complete(), "spin left {} slots empty", 6 - result.takes.len());
    ensure!(
        result.categories.len() == categories().len(),
        "category registry missing from spin result"
    );
    for (category, take) in &result.takes {
        ensure!(take.category == *category, "{} served in {category}", take.id);
        ensure!(take.is_eligible(), "{} is not servable", take.id);
    }
    ensure!(
        result.takes[&CategoryId::Work].id == pinned,
        "work lock {pinned} was not honoured"
    );
    ensure!(
        result.takes[&CategoryId::Philosophy].id != foreign,
        "cross-category lock {foreign} leaked into philosophy"
    );
    Ok(())
}

async fn pick(ctx: &ScenarioCtx) -> Result<()> {
    for category in CategoryId::ALL {
        let pool = eligible_in(&ctx.corpus, category);
        let excluded: Vec<String> = pool.iter().take(1).map(|take| take.id.clone()).collect();
        let request = PickRequest::any(category).excluding(&excluded);
        match ctx.engine.pick_random(&request).await {
            Some(take) => {
                ensure!(take.category == category, "{} picked for {category}", take.id);
                ensure!(!excluded.contains(&take.id), "excluded {} was picked", take.id);
            }
            None => ensure!(pool.len() <= 1, "no pick for {category} despite {} takes", pool.len()),
        }

        let hottest = pool.iter().map(|take| take.intensity()).max().unwrap_or(0);
        let request = PickRequest::any(category).with_intensity(hottest, hottest);
        if let Some(take) = ctx.engine.pick_random(&request).await {
            ensure!(
                take.intensity() == hottest,
                "{} has intensity {} outside {hottest}..={hottest}",
                take.id,
                take.intensity()
            );
        }
    }

    let distribution = ctx.engine.intensity_distribution(None).await;
    let eligible = ctx.corpus.eligible().count();
    ensure!(
        distribution.total() == eligible,
        "distribution counts {} of {eligible} servable takes",
        distribution.total()
    );
    Ok(())
}

async fn codec(ctx: &ScenarioCtx) -> Result<()> {
    let entries = played_card(ctx).await?;
    let token = ctx.engine.encode_stance_card(&entries)?;
    ensure!(
        !token.contains(['+', '/', '=']),
        "token {token} is not URL-safe"
    );
    let decoded = ctx
        .engine
        .decode_stance_card(&token)
        .await
        .with_context(|| format!("token {token} failed to decode"))?;
    ensure!(decoded == entries, "decoded card differs from the played card");
    Ok(())
}

async fn decode_invalid(ctx: &ScenarioCtx) -> Result<()> {
    let ids: Vec<&str> = ctx.corpus.eligible().map(|take| take.id.as_str()).take(6).collect();
    ensure!(ids.len() == 6, "corpus needs six servable takes");

    let full: Vec<(&str, Stance)> = ids.iter().map(|id| (*id, Stance::Agree)).collect();
    let mut unknown = full.clone();
    unknown[2].0 = "ffffffffffff";
    let valid = encode_pairs(&full)?;

    let tokens = [
        String::new(),
        "%%% not base64 %%%".to_string(),
        valid[..12].to_string(),
        encode_pairs(&unknown)?,
    ];
    for token in &tokens {
        ensure!(
            ctx.engine.decode_stance_card(token).await.is_none(),
            "invalid token {token:?} decoded"
        );
    }
    ensure!(
        encode_pairs(&full[..5]).is_err(),
        "a five-entry card must not encode"
    );
    Ok(())
}

async fn stampede(ctx: &ScenarioCtx) -> Result<()> {
    let readers = (0..ctx.concurrency.max(1)).map(|_| {
        let engine = Arc::clone(&ctx.engine);
        tokio::spawn(async move {
            engine
                .pick_random(&PickRequest::any(CategoryId::Society))
                .await
        })
    });
    for joined in join_all(readers).await {
        joined?.context("cold read returned no take")?;
    }
    let queries = ctx.store.corpus_queries();
    ensure!(queries == 1, "{queries} corpus queries for one cold start");
    Ok(())
}

fn payload(take_id: &str, stance: Stance, session: &str, tags: &[&str]) -> VotePayload {
    VotePayload {
        take_id: Some(take_id.to_string()),
        stance: Some(stance.as_str().to_string()),
        reason_tags: Some(tags.iter().map(ToString::to_string).collect()),
        session_id: Some(session.to_string()),
        ..VotePayload::default()
    }
}

async fn votes(ctx: &ScenarioCtx) -> Result<()> {
    let take = ctx
        .corpus
        .eligible()
        .next()
        .context("corpus has no servable takes")?;
    let id = take.id.as_str();
    let reason = take.reasons_for(Stance::Agree).first().map_or("fair", String::as_str);

    for (n, stance) in [Stance::Agree, Stance::Agree, Stance::Disagree].into_iter().enumerate() {
        ctx.engine
            .record_vote(payload(id, stance, &format!("voter-{n}"), &[reason]))
            .await?;
    }
    let receipt = ctx
        .engine
        .record_vote(payload(id, Stance::Agree, "voter-3", &[]))
        .await?;
    ensure!(receipt.aggregate.total_votes == 4, "expected 4 votes, got {}", receipt.aggregate.total_votes);
    ensure!(
        (receipt.aggregate.agree_percentage - 75.0).abs() < f64::EPSILON,
        "expected 75.0% agree, got {}",
        receipt.aggregate.agree_percentage
    );
    ensure!(
        receipt.aggregate.top_reason.as_deref() == Some(reason),
        "top reason {:?}",
        receipt.aggregate.top_reason
    );

    ctx.engine
        .amend_vote(
            receipt.vote_id,
            VoteContext {
                reason_tags: Some(vec![reason.to_string()]),
                explanation: Some("Changed my mind about why".to_string()),
            },
        )
        .await?;
    let stats = ctx.engine.vote_stats(id).await.context("stats unavailable")?;
    ensure!(stats.total_votes == 4, "amend must not add a vote");

    let handle = ctx.engine.submit_vote(payload(id, Stance::Disagree, "voter-4", &[]))?;
    handle.await??;
    ensure!(
        ctx.engine.session_votes("voter-4").await.len() == 1,
        "detached vote missing from session history"
    );
    Ok(())
}

async fn stitch(ctx: &ScenarioCtx) -> Result<()> {
    let ids: Vec<String> = ctx.corpus.eligible().take(3).map(|take| take.id.clone()).collect();
    for id in &ids {
        ctx.engine
            .record_vote(payload(id, Stance::Agree, "anon-session", &[]))
            .await?;
    }
    let first = ctx.engine.stitch("anon-session", "user-one").await?;
    let again = ctx.engine.stitch("anon-session", "user-one").await?;
    let other = ctx.engine.stitch("anon-session", "user-two").await?;
    ensure!(
        usize::try_from(first).ok() == Some(ids.len()),
        "first stitch updated {first} of {} votes",
        ids.len()
    );
    ensure!(again == 0 && other == 0, "stitch is not idempotent ({again}, {other})");
    ensure!(
        ctx.store
            .votes()
            .iter()
            .all(|vote| vote.user_id.as_deref() == Some("user-one")),
        "a vote was reassigned"
    );
    Ok(())
}

async fn collection(ctx: &ScenarioCtx) -> Result<()> {
    let entries = played_card(ctx).await?;
    let token = ctx.engine.encode_stance_card(&entries)?;
    ctx.engine.save_stance_card("collector", &token, None).await?;
    ctx.engine.save_stance_card("collector", &token, None).await?;
    ensure!(
        ctx.engine.save_stance_card("collector", "%%%", None).await.is_err(),
        "garbage token was saved"
    );
    let saved = ctx.engine.saved_stance_cards("collector").await;
    ensure!(saved.len() == 1, "expected 1 saved card, found {}", saved.len());
    ensure!(saved[0].token == token, "saved token differs");
    Ok(())
}
