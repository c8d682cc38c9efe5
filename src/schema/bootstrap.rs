//! Identity scaffolding for plain Postgres.
//!
//! Hosted backends ship `auth.users`, `auth.uid()` and the `anon` /
//! `authenticated` roles already. When `AUTH_BOOTSTRAP` is set, these
//! statements create minimal stand-ins so policies and `book_slot` resolve.
//! Every statement is safe to run repeatedly.

pub fn statements() -> Vec<&'static str> {
    vec![
        "CREATE SCHEMA IF NOT EXISTS auth",
        "CREATE TABLE IF NOT EXISTS auth.users (\n    \
             id uuid PRIMARY KEY DEFAULT gen_random_uuid(),\n    \
             email text UNIQUE,\n    \
             created_at timestamptz NOT NULL DEFAULT now()\n)",
        r#"DO $$
BEGIN
    IF NOT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = 'anon') THEN
        CREATE ROLE anon NOLOGIN;
    END IF;
    IF NOT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = 'authenticated') THEN
        CREATE ROLE authenticated NOLOGIN;
    END IF;
END
$$"#,
        "GRANT anon, authenticated TO CURRENT_USER",
        r#"CREATE OR REPLACE FUNCTION auth.uid()
RETURNS uuid
LANGUAGE sql
STABLE
AS $$
    SELECT coalesce(
        nullif(current_setting('request.jwt.claim.sub', true), ''),
        nullif(current_setting('request.jwt.claims', true), '')::jsonb ->> 'sub'
    )::uuid
$$"#,
        "GRANT USAGE ON SCHEMA auth TO anon, authenticated",
        "GRANT USAGE ON SCHEMA public TO anon, authenticated",
        "GRANT EXECUTE ON FUNCTION auth.uid() TO anon, authenticated",
    ]
}
