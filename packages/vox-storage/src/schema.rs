const INIT_SQL: &str = r#"
CREATE EXTENSION IF NOT EXISTS vector;

CREATE TABLE IF NOT EXISTS accounts (
	account_id uuid PRIMARY KEY,
	role_context text NOT NULL DEFAULT '',
	custom_instructions text,
	vocabulary jsonb NOT NULL DEFAULT '[]'::jsonb,
	timezone text NOT NULL DEFAULT 'UTC',
	device_token text,
	rate_per_minute bigint,
	deleted_at timestamptz,
	created_at timestamptz NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS notes (
	note_id uuid PRIMARY KEY,
	account_id uuid NOT NULL REFERENCES accounts(account_id),
	status text NOT NULL DEFAULT 'PENDING',
	audio_reference text NOT NULL,
	transcript text,
	summary text,
	title text,
	priority text,
	tags jsonb NOT NULL DEFAULT '[]'::jsonb,
	embedding_version text,
	processing_duration_ms bigint,
	failure_reason text,
	conflicts jsonb NOT NULL DEFAULT '[]'::jsonb,
	deleted_at timestamptz,
	created_at timestamptz NOT NULL DEFAULT now(),
	updated_at timestamptz NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_notes_account_status ON notes (account_id, status);

CREATE TABLE IF NOT EXISTS note_transcripts (
	note_id uuid NOT NULL REFERENCES notes(note_id) ON DELETE CASCADE,
	engine text NOT NULL,
	transcript text NOT NULL,
	created_at timestamptz NOT NULL DEFAULT now(),
	PRIMARY KEY (note_id, engine)
);

CREATE TABLE IF NOT EXISTS note_embeddings (
	note_id uuid PRIMARY KEY REFERENCES notes(note_id) ON DELETE CASCADE,
	embedding_version text NOT NULL,
	embedding_dim integer NOT NULL,
	vec vector(<VECTOR_DIM>) NOT NULL,
	created_at timestamptz NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS note_links (
	note_id uuid NOT NULL REFERENCES notes(note_id) ON DELETE CASCADE,
	related_note_id uuid NOT NULL REFERENCES notes(note_id) ON DELETE CASCADE,
	similarity real NOT NULL,
	created_at timestamptz NOT NULL DEFAULT now(),
	PRIMARY KEY (note_id, related_note_id)
);

CREATE TABLE IF NOT EXISTS tasks (
	task_id uuid PRIMARY KEY,
	account_id uuid NOT NULL REFERENCES accounts(account_id),
	note_id uuid REFERENCES notes(note_id),
	title text NOT NULL,
	description text NOT NULL DEFAULT '',
	priority text NOT NULL DEFAULT 'normal',
	deadline timestamptz,
	suggested_actions jsonb NOT NULL DEFAULT '[]'::jsonb,
	deleted_at timestamptz,
	created_at timestamptz NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_tasks_fingerprint ON tasks (account_id, note_id, title);

CREATE TABLE IF NOT EXISTS wallets (
	wallet_id uuid PRIMARY KEY,
	account_id uuid NOT NULL UNIQUE REFERENCES accounts(account_id),
	balance bigint NOT NULL DEFAULT 0,
	currency text NOT NULL,
	is_frozen boolean NOT NULL DEFAULT false,
	created_at timestamptz NOT NULL DEFAULT now(),
	updated_at timestamptz NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS wallet_transactions (
	id uuid PRIMARY KEY,
	wallet_id uuid NOT NULL REFERENCES wallets(wallet_id),
	amount bigint NOT NULL,
	balance_after bigint NOT NULL,
	type text NOT NULL,
	description text NOT NULL DEFAULT '',
	reference_id text,
	created_at timestamptz NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_wallet_transactions_wallet
	ON wallet_transactions (wallet_id, created_at);

CREATE TABLE IF NOT EXISTS processing_queue (
	queue_id uuid PRIMARY KEY,
	note_id uuid NOT NULL REFERENCES notes(note_id) ON DELETE CASCADE,
	payload jsonb NOT NULL,
	status text NOT NULL DEFAULT 'PENDING',
	attempts integer NOT NULL DEFAULT 0,
	last_error text,
	available_at timestamptz NOT NULL DEFAULT now(),
	created_at timestamptz NOT NULL DEFAULT now(),
	updated_at timestamptz NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_processing_queue_due ON processing_queue (status, available_at);

CREATE TABLE IF NOT EXISTS pipeline_events (
	event_id uuid PRIMARY KEY,
	account_id uuid NOT NULL,
	note_id uuid NOT NULL,
	event_type text NOT NULL,
	payload jsonb NOT NULL DEFAULT '{}'::jsonb,
	created_at timestamptz NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_pipeline_events_account
	ON pipeline_events (account_id, created_at);
"#;

pub fn render_schema(vector_dim: u32) -> String {
	INIT_SQL.replace("<VECTOR_DIM>", &vector_dim.to_string())
}
