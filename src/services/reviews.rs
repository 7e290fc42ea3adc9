use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    booking::{Booking, BookingStatus},
    customer::Customer,
    review::{CreateReviewData, Review},
};

pub const MAX_COMMENT_LEN: usize = 1000;

#[derive(thiserror::Error, Debug)]
pub enum ReviewError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Booking not found")]
    BookingNotFound,

    #[error("Only completed bookings can be reviewed")]
    NotCompleted,

    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(i16),

    #[error("Comment must be at most {} characters", MAX_COMMENT_LEN)]
    CommentTooLong,

    #[error("This booking has already been reviewed")]
    AlreadyReviewed,
}

impl From<ReviewError> for AppError {
    fn from(err: ReviewError) -> Self {
        match err {
            ReviewError::DatabaseError(e) => AppError::Database(e),
            ReviewError::BookingNotFound => AppError::NotFound(err.to_string()),
            ReviewError::AlreadyReviewed => AppError::Conflict(err.to_string()),
            ReviewError::NotCompleted => AppError::Forbidden(err.to_string()),
            ReviewError::InvalidRating(_) | ReviewError::CommentTooLong => {
                AppError::Validation(err.to_string())
            }
        }
    }
}

/// Aggregated ratings of a tenant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewSummary {
    pub total: i64,
    /// Mean rating rounded to one decimal, 0.0 without reviews
    pub average: f64,
    /// `distribution[i]` counts reviews with `i + 1` stars
    pub distribution: [i64; 5],
}

/// Folds `(rating, count)` pairs into a summary; out-of-range ratings are ignored
pub fn summarize(counts: &[(i16, i64)]) -> ReviewSummary {
    let mut distribution = [0i64; 5];
    for &(rating, count) in counts {
        if (1..=5).contains(&rating) {
            distribution[(rating - 1) as usize] += count;
        }
    }

    let total: i64 = distribution.iter().sum();
    let weighted: i64 = distribution
        .iter()
        .enumerate()
        .map(|(i, count)| (i as i64 + 1) * count)
        .sum();

    let average = if total > 0 {
        (weighted as f64 / total as f64 * 10.0).round() / 10.0
    } else {
        0.0
    };

    ReviewSummary {
        total,
        average,
        distribution,
    }
}

pub async fn summary(
    pool: &PgPool,
    tenant_id: Uuid,
    visible_only: bool,
) -> Result<ReviewSummary, sqlx::Error> {
    let counts = Review::rating_counts(pool, tenant_id, visible_only).await?;
    Ok(summarize(&counts))
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitReviewRequest {
    /// Must match the email the booking was made with
    pub email: String,
    pub rating: i16,
    pub comment: Option<String>,
}

/// Stores a customer's review of a completed booking
#[tracing::instrument(skip(pool, request), fields(rating = request.rating))]
pub async fn submit_review(
    pool: &PgPool,
    booking_id: Uuid,
    request: SubmitReviewRequest,
) -> Result<Review, ReviewError> {
    if !(1..=5).contains(&request.rating) {
        return Err(ReviewError::InvalidRating(request.rating));
    }

    let comment = request
        .comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if comment.as_ref().is_some_and(|c| c.chars().count() > MAX_COMMENT_LEN) {
        return Err(ReviewError::CommentTooLong);
    }

    let booking = Booking::find_by_id(pool, booking_id)
        .await?
        .ok_or(ReviewError::BookingNotFound)?;

    // Unknown email answers like an unknown booking so ids cannot be probed
    let customer = Customer::find_by_id(pool, booking.customer_id)
        .await?
        .filter(|c| c.email.eq_ignore_ascii_case(request.email.trim()))
        .ok_or(ReviewError::BookingNotFound)?;

    if booking.status() != Ok(BookingStatus::Completed) {
        return Err(ReviewError::NotCompleted);
    }

    let review = Review::create(
        pool,
        CreateReviewData {
            tenant_id: booking.tenant_id,
            booking_id,
            customer_id: customer.id,
            rating: request.rating,
            comment,
        },
    )
    .await?
    .ok_or(ReviewError::AlreadyReviewed)?;

    tracing::info!(review_id = %review.id, tenant_id = %review.tenant_id, "Review submitted");

    Ok(review)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.average, 0.0);
        assert_eq!(summary.distribution, [0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_summarize_rounds_average() {
        // (5*2 + 4*1) / 3 = 4.666.. -> 4.7
        let summary = summarize(&[(5, 2), (4, 1)]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.average, 4.7);
        assert_eq!(summary.distribution, [0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_summarize_ignores_out_of_range_ratings() {
        let summary = summarize(&[(0, 4), (6, 1), (3, 2), (1, 2)]);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.average, 2.0);
        assert_eq!(summary.distribution, [2, 0, 2, 0, 0]);
    }

    #[test]
    fn test_summarize_merges_duplicate_rows() {
        let summary = summarize(&[(5, 1), (5, 3)]);
        assert_eq!(summary.distribution[4], 4);
        assert_eq!(summary.average, 5.0);
    }
}
