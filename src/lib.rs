/*!
# Excel Analytics Service

A spreadsheet upload and analytics web service with user accounts, an admin panel
and optional AI-generated business insights, built in Rust.

## Overview

Users upload Excel workbooks, pick columns to chart, and get per-column statistics
for the numeric ones. On request the service summarizes the selected columns into a
prompt for a text-generation service and splits the answer into labeled insight
records. Admins see cross-user totals and can deactivate accounts.

## Architecture

### Analysis Pipeline
- **Tabular Parser** (`loader`) - Upload validation and first-sheet parsing into row records
- **Numeric Summarizer** (`statistics`) - Mean, min, max and count per numeric column
- **Insight Request Builder** (`insights::prompt`) - Bounded prompt from columns, sample rows and statistics
- **Text Generation** (`insights::client`) - Gemini client with retry behind the `TextGenerator` trait
- **AI Response Segmenter** (`insights::segmenter`) - Generated text into typed insight records

### Service Layer
- **Rate Limiter** (`rate_limit`) - Per-user sliding window in front of the AI path
- **Admin Aggregator** (`admin`) - User, storage and chart-usage projections
- **Accounts** (`login`) - Argon2 password hashing and token sessions
- **Store** (`store`) - JSON documents for users and file metadata

### Data Persistence Layer
- `users.json` and `files.json` in the data directory, rewritten atomically
- Uploaded workbooks under `uploads/`
- XLSX and CSV export of selected columns

## Modules

- **cell**: Cell values and ordered row records
- **config**: Environment configuration
- **error**: Service error type and HTTP mapping
- **loader**: Upload policy and workbook parsing
- **statistics**: Numeric column summaries
- **insights**: Prompt building, generation and segmentation
- **rate_limit**: Sliding-window limiter
- **store**: Document store
- **login**: Accounts and sessions
- **admin**: Aggregate statistics
- **downloader**: Export functionality (CSV, XLSX)
- **app**: Routing and middleware
*/

pub mod admin;
pub mod cell;
pub mod config;
pub mod downloader;
pub mod error;
pub mod insights;
pub mod loader;
pub mod login;
pub mod rate_limit;
pub mod statistics;
pub mod store;

#[cfg(feature = "web")]
pub mod app;
