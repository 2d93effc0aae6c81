mod mocks;

mod disputes;
mod orders;
mod stores;
