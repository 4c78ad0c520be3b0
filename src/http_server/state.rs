use crate::services::random_pick::RandomPickService;

pub struct AppState {
    pub picks: RandomPickService,
}
