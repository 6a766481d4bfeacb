mod callback;
mod compensation;
mod helpers;
mod mocks;
mod webhook;
