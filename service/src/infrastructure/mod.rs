use crate::domain::AppState;
use crate::domain::notifications::JobInvoker;
use crate::domain::posts::PostRepository;
use crate::domain::requests::LinkRequestRepository;
use crate::domain::requests::duplicates::DuplicateDetector;
use crate::domain::requests::links::InstitutionLinkRepository;
use crate::domain::requests::review::ReviewCoordinator;
use crate::infrastructure::settings::ReviewSettings;

pub mod http;
pub mod jobs;
#[cfg(test)]
pub mod memory;
pub mod persistence;
pub mod settings;

#[derive(Clone)]
pub struct AppStateImpl<R, L, J, P>
where
    R: LinkRequestRepository,
    L: InstitutionLinkRepository,
    J: JobInvoker,
    P: PostRepository,
{
    requests: R,
    reviews: ReviewCoordinator<R, L, J>,
    duplicates: DuplicateDetector<L>,
    posts: P,
}

impl<R, L, J, P> AppStateImpl<R, L, J, P>
where
    R: LinkRequestRepository,
    L: InstitutionLinkRepository,
    J: JobInvoker,
    P: PostRepository,
{
    pub fn new(requests: R, links: L, jobs: J, posts: P, review: &ReviewSettings) -> Self {
        let reviews = ReviewCoordinator::new(requests.clone(), links.clone(), jobs)
            .with_batch_concurrency(review.batch_concurrency)
            .with_repair_grace(review.repair_grace());
        Self {
            requests,
            reviews,
            duplicates: DuplicateDetector::new(links),
            posts,
        }
    }
}

impl<R, L, J, P> AppState for AppStateImpl<R, L, J, P>
where
    R: LinkRequestRepository,
    L: InstitutionLinkRepository,
    J: JobInvoker,
    P: PostRepository,
{
    type R = R;
    type L = L;
    type J = J;
    type P = P;

    fn link_requests(&self) -> &Self::R {
        &self.requests
    }

    fn reviews(&self) -> &ReviewCoordinator<Self::R, Self::L, Self::J> {
        &self.reviews
    }

    fn duplicates(&self) -> &DuplicateDetector<Self::L> {
        &self.duplicates
    }

    fn posts(&self) -> &Self::P {
        &self.posts
    }
}
