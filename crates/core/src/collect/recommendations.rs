use crate::domain::recommendation::RecommendationBundle;
use crate::fetch::{JsonSource, Pacer};

/// Per-ticker sub-documents, in the order they are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecommendationKind {
    Summary,
    PriceGuidance,
    InvestmentRating,
}

impl RecommendationKind {
    pub const ALL: [RecommendationKind; 3] = [
        RecommendationKind::Summary,
        RecommendationKind::PriceGuidance,
        RecommendationKind::InvestmentRating,
    ];

    pub fn endpoint(self) -> &'static str {
        match self {
            RecommendationKind::Summary => "recommendation-summary",
            RecommendationKind::PriceGuidance => "price-guidance",
            RecommendationKind::InvestmentRating => "investment-rating",
        }
    }

    pub fn path(self, ticker: &str) -> String {
        format!("/stocks/{ticker}/{}", self.endpoint())
    }
}

pub struct RecommendationCollector<'a> {
    source: &'a dyn JsonSource,
    pacer: Pacer,
}

impl<'a> RecommendationCollector<'a> {
    pub fn new(source: &'a dyn JsonSource, pacer: Pacer) -> Self {
        Self { source, pacer }
    }

    /// Fetches summary, price guidance and rating for one ticker, pacing after
    /// each call. A failed sub-fetch leaves its slot empty and never skips the
    /// remaining ones.
    pub async fn collect(&self, ticker: &str) -> RecommendationBundle {
        let mut bundle = RecommendationBundle::default();

        for kind in RecommendationKind::ALL {
            let doc = self
                .source
                .fetch_json(&kind.path(ticker), &[])
                .await
                .into_option();

            match kind {
                RecommendationKind::Summary => bundle.summary = doc,
                RecommendationKind::PriceGuidance => bundle.price_guidance = doc,
                RecommendationKind::InvestmentRating => bundle.investment_rating = doc,
            }

            self.pacer.pace().await;
        }

        bundle
    }
}
